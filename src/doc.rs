//! Extraction and validation of the `id` and `rev` fields of a document.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::keyspace;

/// A document parsed and validated on ingress.
#[derive(Debug)]
pub(crate) struct DocFields {
    /// The parsed JSON object, mutated in place when the new revision is set.
    pub value: Value,
    pub id: String,
    pub rev: String,
}

/// Parse a raw document and pull out its identity fields.
///
/// The id must be a non-empty string free of the reserved marker bytes.
/// The rev must be a string field; the empty string marks a first write.
pub(crate) fn inspect(raw: &[u8]) -> Result<DocFields> {
    let value: Value = serde_json::from_slice(raw)?;
    let Some(object) = value.as_object() else {
        return Err(Error::NoId);
    };

    let id = match object.get("id") {
        None => return Err(Error::NoId),
        Some(Value::String(id)) => id.clone(),
        Some(other) => {
            return Err(Error::InvalidId {
                id: other.to_string(),
            })
        }
    };
    if id.is_empty() || id.bytes().any(|b| keyspace::RESERVED.contains(&b)) {
        return Err(Error::InvalidId { id });
    }

    let rev = match object.get("rev") {
        Some(Value::String(rev)) => rev.clone(),
        _ => return Err(Error::NoRev),
    };

    Ok(DocFields { value, id, rev })
}

/// Write a freshly minted revision token into the parsed document.
pub(crate) fn set_rev(value: &mut Value, rev: &str) {
    if let Some(object) = value.as_object_mut() {
        object.insert("rev".to_string(), Value::String(rev.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_valid() -> anyhow::Result<()> {
        let fields = inspect(br#"{"id":"C4","rev":"","text":"Hi!"}"#)?;
        assert_eq!(fields.id, "C4");
        assert_eq!(fields.rev, "");
        Ok(())
    }

    #[test]
    fn inspect_rejects() {
        assert!(matches!(
            inspect(b"not json"),
            Err(Error::InvalidJsonDoc(_))
        ));
        assert!(matches!(inspect(br#"{"rev":""}"#), Err(Error::NoId)));
        assert!(matches!(inspect(br#"[1,2,3]"#), Err(Error::NoId)));
        assert!(matches!(inspect(br#"{"id":"C4"}"#), Err(Error::NoRev)));
        assert!(matches!(
            inspect(br#"{"id":"C4","rev":7}"#),
            Err(Error::NoRev)
        ));
        assert!(matches!(
            inspect(br#"{"id":"","rev":""}"#),
            Err(Error::InvalidId { .. })
        ));
        assert!(matches!(
            inspect(br#"{"id":7,"rev":""}"#),
            Err(Error::InvalidId { .. })
        ));
        for id in ["a^b", "a&b", "a.b", "a>b", "a<b"] {
            let raw = format!(r#"{{"id":"{id}","rev":""}}"#);
            assert!(
                matches!(inspect(raw.as_bytes()), Err(Error::InvalidId { .. })),
                "id {id:?} must be rejected"
            );
        }
    }

    #[test]
    fn rev_write_back() -> anyhow::Result<()> {
        let mut fields = inspect(br#"{"id":"C4","rev":""}"#)?;
        set_rev(&mut fields.value, "00000000000000ff");
        let raw = serde_json::to_vec(&fields.value)?;
        let fields = inspect(&raw)?;
        assert_eq!(fields.rev, "00000000000000ff");
        Ok(())
    }
}
