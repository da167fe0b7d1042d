//! Data models for rooms, messages and presence

mod message;
mod room;
mod timestamp;
mod user;

pub use message::*;
pub use room::*;
pub use timestamp::*;
pub use user::*;

use serde::de;
use serde::{Deserialize, Deserializer};

/// Server-assigned identifier of a user session within one channel join.
pub type UserId = String;

/// Server-assigned message identifier, unique within one room only.
pub type MessageId = i64;

/// Accept ids sent either as JSON numbers or as strings.
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = String;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("integer or string id")
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }
    }
    d.deserialize_any(Visitor)
}

/// Optional variant of [`string_or_number`]; `null` and absence map to `None`.
pub(crate) fn opt_string_or_number<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<String>, D::Error> {
    struct Id(String);
    impl<'de> Deserialize<'de> for Id {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            string_or_number(d).map(Id)
        }
    }
    Ok(Option::<Id>::deserialize(d)?.map(|id| id.0))
}
