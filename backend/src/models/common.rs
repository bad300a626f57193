/// `HH:MM` wall-clock serialization for slot start and end times.
pub mod hhmm {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::{macros::format_description, Time};

    pub fn serialize<S: Serializer>(value: &Time, serializer: S) -> Result<S::Ok, S::Error> {
        let out = value
            .format(format_description!("[hour]:[minute]"))
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&out)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Time::parse(&raw, format_description!("[hour]:[minute]"))
            .map_err(|_| serde::de::Error::custom(format!("expected HH:MM, got {raw:?}")))
    }
}
