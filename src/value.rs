use bytes::Bytes;
use serde::de;
use serde::ser;
use std::fmt;
use std::ops::Deref;

/// Value that the acceptors agree upon to reach consensus.
///
/// Any serializable type with well-defined equality can be decided, so
/// the trait is implemented for every type that satisfies the bounds.
pub trait Value:
    ser::Serialize
    + de::DeserializeOwned
    + PartialEq
    + Eq
    + Clone
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
}

impl<T> Value for T where
    T: ser::Serialize
        + de::DeserializeOwned
        + PartialEq
        + Eq
        + Clone
        + fmt::Debug
        + Send
        + Sync
        + 'static
{
}

/// Paxos `Value` that is an opaque array of bytes.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct BytesValue(pub Bytes);

impl From<Vec<u8>> for BytesValue {
    fn from(vec: Vec<u8>) -> BytesValue {
        BytesValue(vec.into())
    }
}

impl From<String> for BytesValue {
    fn from(s: String) -> BytesValue {
        BytesValue(s.into())
    }
}

impl From<&'static str> for BytesValue {
    fn from(s: &'static str) -> BytesValue {
        BytesValue(Bytes::from_static(s.as_bytes()))
    }
}

impl Deref for BytesValue {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.deref()
    }
}

impl fmt::Display for BytesValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self))
    }
}

impl ser::Serialize for BytesValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        serializer.serialize_bytes(self)
    }
}

impl<'de> de::Deserialize<'de> for BytesValue {
    fn deserialize<D>(deserializer: D) -> Result<BytesValue, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_byte_buf(BytesValueVisitor)
    }
}

struct BytesValueVisitor;

impl<'de> de::Visitor<'de> for BytesValueVisitor {
    type Value = BytesValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a byte array/string")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(BytesValue(Bytes::copy_from_slice(v)))
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(v.into())
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(BytesValue(Bytes::copy_from_slice(v.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_value_bincode() {
        let value = BytesValue::from("hello world");
        let encoded = bincode::serialize(&value).unwrap();
        // length prefix followed by the raw bytes
        assert_eq!(encoded.len(), 8 + 11);
        let decoded: BytesValue = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(&*decoded, b"hello world");
    }

    #[test]
    fn bytes_value_display() {
        assert_eq!(BytesValue::from(vec![104, 105]).to_string(), "hi");
    }

    #[test]
    fn plain_types_are_values() {
        fn assert_value<V: Value>() {}
        assert_value::<u64>();
        assert_value::<String>();
        assert_value::<BytesValue>();
    }
}
