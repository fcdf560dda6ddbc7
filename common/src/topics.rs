use std::fmt::Display;

use crate::config::ChannelField;

pub fn publish_topic(field: &ChannelField) -> String {
    format!("channels/{}/publish", field.channel_id)
}

pub fn field_payload(field: &ChannelField, value: impl Display) -> String {
    match field.api_key.as_deref() {
        Some(key) if !key.is_empty() => format!("api_key={key}&field{}={value}", field.field),
        _ => format!("field{}={value}", field.field),
    }
}

pub fn last_value_url(base_url: &str, field: &ChannelField) -> String {
    let base = base_url.trim_end_matches('/');
    let mut url = format!(
        "{base}/channels/{}/fields/{}/last.txt",
        field.channel_id, field.field
    );
    if let Some(key) = field.api_key.as_deref().filter(|key| !key.is_empty()) {
        url.push_str("?api_key=");
        url.push_str(key);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(api_key: Option<&str>) -> ChannelField {
        ChannelField {
            channel_id: "2792381".to_string(),
            field: 8,
            api_key: api_key.map(str::to_string),
        }
    }

    #[test]
    fn formats_topic_and_payloads() {
        assert_eq!(publish_topic(&field(None)), "channels/2792381/publish");
        assert_eq!(field_payload(&field(None), 90), "field8=90");
        assert_eq!(
            field_payload(&field(Some("WRITE")), 100),
            "api_key=WRITE&field8=100"
        );
        assert_eq!(field_payload(&field(Some("")), 1.5), "field8=1.5");
    }

    #[test]
    fn formats_last_value_url() {
        assert_eq!(
            last_value_url("https://api.thingspeak.com/", &field(Some("READ"))),
            "https://api.thingspeak.com/channels/2792381/fields/8/last.txt?api_key=READ"
        );
        assert_eq!(
            last_value_url("http://localhost:8080", &field(None)),
            "http://localhost:8080/channels/2792381/fields/8/last.txt"
        );
    }
}
