//! Serialized form of a [`Poll`].
//!
//! Mapping-typed fields are wrapped in a tagged envelope so that plain JSON
//! objects and maps can never be confused with one another:
//!
//! ```json
//! {
//!     "id": "b7a3...",
//!     "expiration": 1700000000,
//!     "choices": { "__type": "Map", "value": { "0": { "votes": 2 } } },
//!     "voters": { "__type": "Map", "value": { "1234": "0" } }
//! }
//! ```

use crate::poll::{Choice, Choices, Poll};
use alloc::{boxed::Box, collections::BTreeMap};
use core::{
    fmt::{self, Formatter},
    marker::PhantomData,
};
use serde::{
    de::{DeserializeOwned, Error as _, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use uuid::Uuid;

/// Envelope tag for map-typed values.
pub const MAP_TAG: &str = "Map";

/// Field-level (de)serializers for the `{"__type": "Map", "value": ...}`
/// envelope. Use with `#[serde(with = "tagged")]`.
pub mod tagged {
    use super::MAP_TAG;
    use core::{
        fmt::{self, Formatter},
        marker::PhantomData,
    };
    use serde::{
        de::{Error, MapAccess, Visitor},
        ser::SerializeStruct,
        Deserialize, Deserializer, Serialize, Serializer,
    };

    pub fn serialize<M, S>(value: &M, serializer: S) -> Result<S::Ok, S::Error>
    where
        M: Serialize,
        S: Serializer,
    {
        let mut envelope = serializer.serialize_struct("Tagged", 2)?;
        envelope.serialize_field("__type", MAP_TAG)?;
        envelope.serialize_field("value", value)?;
        envelope.end()
    }

    pub fn deserialize<'de, M, D>(deserializer: D) -> Result<M, D::Error>
    where
        M: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        deserializer.deserialize_struct("Tagged", &FIELDS, TaggedVisitor(PhantomData))
    }

    const FIELDS: [&str; 2] = ["__type", "value"];

    #[derive(Deserialize)]
    #[serde(field_identifier)]
    enum Field {
        #[serde(rename = "__type")]
        Type,
        #[serde(rename = "value")]
        Value,
    }

    struct TaggedVisitor<M>(PhantomData<M>);

    impl<'de, M: Deserialize<'de>> Visitor<'de> for TaggedVisitor<M> {
        type Value = M;

        fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
            formatter.write_str("a tagged map envelope")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            use alloc::boxed::Box;
            use serde::de::Unexpected;

            let mut tagged = false;
            let mut value = None::<M>;

            while let Some(field) = map.next_key::<Field>()? {
                match field {
                    Field::Type if tagged => return Err(A::Error::duplicate_field("__type")),
                    Field::Value if value.is_some() => return Err(A::Error::duplicate_field("value")),
                    Field::Type => {
                        let tag = map.next_value::<Box<str>>()?;
                        if tag.as_ref() != MAP_TAG {
                            return Err(A::Error::invalid_value(Unexpected::Str(&tag), &MAP_TAG));
                        }
                        tagged = true;
                    }
                    Field::Value => value = Some(map.next_value()?),
                }
            }

            if !tagged {
                return Err(A::Error::missing_field("__type"));
            }

            value.ok_or_else(|| A::Error::missing_field("value"))
        }
    }
}

#[derive(Serialize)]
#[serde(bound = "T: Serialize")]
struct ChoiceRef<'a, T> {
    votes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a T>,
}

#[derive(Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct ChoiceData<T> {
    votes: u64,
    #[serde(default)]
    metadata: Option<T>,
}

impl<T: Serialize> Serialize for Choices<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, Choice { votes, metadata }) in self.iter() {
            map.serialize_entry(key, &ChoiceRef { votes: *votes, metadata: metadata.as_ref() })?;
        }
        map.end()
    }
}

struct ChoicesVisitor<T>(PhantomData<T>);

impl<'de, T: DeserializeOwned> Visitor<'de> for ChoicesVisitor<T> {
    type Value = Choices<T>;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a map of choices")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        // Entries are kept in document order since ties are broken by insertion order.
        let mut choices = Choices::default();
        while let Some((key, ChoiceData { votes, metadata })) = map.next_entry::<Box<str>, ChoiceData<T>>()? {
            if let Err(key) = choices.push(key, Choice { votes, metadata }) {
                return Err(A::Error::custom(alloc::format!("duplicate choice `{key}`")));
            }
        }
        Ok(choices)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Choices<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ChoicesVisitor(PhantomData))
    }
}

#[derive(Serialize)]
#[serde(bound = "T: Serialize")]
struct PollRef<'a, T> {
    id: &'a Uuid,
    expiration: u64,
    #[serde(with = "tagged")]
    choices: &'a Choices<T>,
    #[serde(with = "tagged")]
    voters: &'a BTreeMap<Box<str>, Box<str>>,
}

#[derive(Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct PollData<T> {
    id: Uuid,
    expiration: u64,
    #[serde(with = "tagged")]
    choices: Choices<T>,
    #[serde(with = "tagged")]
    voters: BTreeMap<Box<str>, Box<str>>,
}

impl<T: Serialize> Serialize for Poll<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Self { id, expiration, choices, voters } = self;
        PollRef { id, expiration: *expiration, choices, voters }.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Poll<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let PollData { id, expiration, choices, voters } = PollData::deserialize(deserializer)?;
        Poll::from_parts(id, expiration, choices, voters).map_err(D::Error::custom)
    }
}
