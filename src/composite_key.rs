/*!
# Composite keys

A composite key packs an object type and an ordered list of attributes into a
single state key:

```bytes
\x00 objectType \x00 attr1 \x00 attr2 \x00 ... attrN \x00
```

The leading U+0000 keeps composite keys out of the simple-key namespace, and
because every segment is terminated by the lowest code point, byte order of
the keys follows attribute order. Range scans over a partial key run from the
partial key to the partial key followed by U+10FFFF.
*/

use crate::{Error, Result};

pub const COMPOSITE_KEY_NAMESPACE: char = '\u{0000}';
pub const MIN_UNICODE_RUNE_VALUE: char = '\u{0000}';
pub const MAX_UNICODE_RUNE_VALUE: char = '\u{10FFFF}';

/// Substituted for an empty range start key; the peer treats an empty start
/// key as "no lower bound" only when it is not empty on the wire.
pub const EMPTY_KEY_SUBSTITUTE: &str = "\u{0001}";

fn validate_composite_key_attribute(attribute: &str) -> Result<()> {
    if attribute.contains(MIN_UNICODE_RUNE_VALUE) || attribute.contains(MAX_UNICODE_RUNE_VALUE) {
        return Err(Error::InvalidArgument(format!(
            "input contains unicode {:#X} or {:#X} which are reserved and not allowed in composite keys: {:?}",
            MIN_UNICODE_RUNE_VALUE as u32, MAX_UNICODE_RUNE_VALUE as u32, attribute
        )));
    }
    Ok(())
}

pub fn create_composite_key<S: AsRef<str>>(object_type: &str, attributes: &[S]) -> Result<String> {
    validate_composite_key_attribute(object_type)?;
    let mut key = String::with_capacity(
        2 + object_type.len()
            + attributes
                .iter()
                .map(|attribute| attribute.as_ref().len() + 1)
                .sum::<usize>(),
    );
    key.push(COMPOSITE_KEY_NAMESPACE);
    key.push_str(object_type);
    key.push(MIN_UNICODE_RUNE_VALUE);
    for attribute in attributes {
        let attribute = attribute.as_ref();
        validate_composite_key_attribute(attribute)?;
        key.push_str(attribute);
        key.push(MIN_UNICODE_RUNE_VALUE);
    }
    Ok(key)
}

/// Inverse of [`create_composite_key`].
pub fn split_composite_key(composite_key: &str) -> Result<(String, Vec<String>)> {
    let body = composite_key
        .strip_prefix(COMPOSITE_KEY_NAMESPACE)
        .and_then(|body| body.strip_suffix(MIN_UNICODE_RUNE_VALUE))
        .ok_or_else(|| {
            Error::InvalidArgument(format!("{:?} is not a composite key", composite_key))
        })?;
    let mut segments = body.split(MIN_UNICODE_RUNE_VALUE).map(String::from);
    let object_type = segments.next().unwrap_or_default();
    Ok((object_type, segments.collect()))
}

/// Rejects simple keys that would collide with the composite key namespace.
pub fn validate_simple_keys(keys: &[&str]) -> Result<()> {
    for key in keys {
        if key.starts_with(COMPOSITE_KEY_NAMESPACE) {
            return Err(Error::InvalidArgument(format!(
                "first character of the key {:?} contains a null character which is not allowed",
                key
            )));
        }
    }
    Ok(())
}

/// End of the range covering every key that starts with `partial_key`.
pub fn partial_key_range_end(partial_key: &str) -> String {
    let mut end = String::with_capacity(partial_key.len() + 4);
    end.push_str(partial_key);
    end.push(MAX_UNICODE_RUNE_VALUE);
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_wire_format() {
        let key = create_composite_key("asset", &["blue", "5"]).unwrap();
        assert_eq!(key, "\u{0}asset\u{0}blue\u{0}5\u{0}");
    }

    #[test]
    fn split_is_inverse_of_create() {
        let cases: Vec<(&str, Vec<&str>)> = vec![
            ("asset", vec!["blue", "5"]),
            ("owner", vec![]),
            ("", vec!["a"]),
            ("", vec![]),
            ("marble", vec!["", "red", ""]),
            ("日本", vec!["東京", "\u{1F600}"]),
        ];
        for (object_type, attributes) in cases {
            let key = create_composite_key(object_type, &attributes).unwrap();
            let (split_type, split_attributes) = split_composite_key(&key).unwrap();
            assert_eq!(split_type, object_type);
            assert_eq!(split_attributes, attributes);
        }
    }

    #[test]
    fn ordering_follows_attributes() {
        let a = create_composite_key("asset", &["a", "z"]).unwrap();
        let b = create_composite_key("asset", &["ab", "a"]).unwrap();
        let c = create_composite_key("asset", &["b"]).unwrap();
        assert!(a < b);
        assert!(b < c);
        let partial = create_composite_key("asset", &["a"]).unwrap();
        let end = partial_key_range_end(&partial);
        assert!(partial <= a && a < end);
        assert!(b > end);
    }

    #[test]
    fn reserved_runes_are_rejected() {
        assert!(matches!(
            create_composite_key("asset", &["a\u{0}b"]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            create_composite_key("asset\u{10FFFF}", &["a"]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn simple_keys_cannot_start_with_null() {
        assert!(validate_simple_keys(&["a", "b"]).is_ok());
        assert!(validate_simple_keys(&["a", "\u{0}b"]).is_err());
    }

    #[test]
    fn split_rejects_simple_keys() {
        assert!(split_composite_key("asset1").is_err());
        assert!(split_composite_key("").is_err());
    }
}
