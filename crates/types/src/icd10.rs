use crate::TextError;

/// A normalised ICD-10 diagnosis code such as `K02.1`.
///
/// Accepted input is a letter, two characters (a digit and a digit or letter),
/// then optionally up to four more alphanumerics with or without the dot. Input
/// is upper-cased and the dot is re-inserted after the third character, so
/// `k021` and `K02.1` are the same code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Icd10Code(String);

impl Icd10Code {
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let raw = input.as_ref().trim();
        let invalid = || TextError::InvalidIcd10(raw.to_string());
        if raw.is_empty() {
            return Err(TextError::Empty);
        }
        if !raw.is_ascii() {
            return Err(invalid());
        }

        let upper = raw.to_ascii_uppercase();
        let (category, subcategory) = match upper.split_once('.') {
            Some((head, tail)) => {
                if tail.is_empty() || head.len() != 3 {
                    return Err(invalid());
                }
                (head.to_string(), tail.to_string())
            }
            None if upper.len() > 3 => (upper[..3].to_string(), upper[3..].to_string()),
            None => (upper.clone(), String::new()),
        };

        let cat = category.as_bytes();
        let category_ok = cat.len() == 3
            && cat[0].is_ascii_uppercase()
            && cat[1].is_ascii_digit()
            && cat[2].is_ascii_alphanumeric();
        let subcategory_ok = subcategory.len() <= 4
            && subcategory.bytes().all(|b| b.is_ascii_alphanumeric());
        if !category_ok || !subcategory_ok {
            return Err(invalid());
        }

        if subcategory.is_empty() {
            Ok(Self(category))
        } else {
            Ok(Self(format!("{category}.{subcategory}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The three-character category, e.g. `K02` for `K02.1`.
    pub fn category(&self) -> &str {
        &self.0[..3]
    }

    /// The code with the dot removed, used for prefix searches.
    pub fn compact(&self) -> String {
        self.0.replace('.', "")
    }
}

impl std::fmt::Display for Icd10Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for Icd10Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Icd10Code {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Icd10Code::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalises_case_and_dot() {
        assert_eq!(Icd10Code::parse("k021").unwrap().as_str(), "K02.1");
        assert_eq!(Icd10Code::parse("K02.1").unwrap().as_str(), "K02.1");
        assert_eq!(Icd10Code::parse(" k05 ").unwrap().as_str(), "K05");
    }

    #[test]
    fn test_category_and_compact_form() {
        let code = Icd10Code::parse("S02.5XXA").unwrap();
        assert_eq!(code.category(), "S02");
        assert_eq!(code.compact(), "S025XXA");
    }

    #[test]
    fn test_rejects_malformed_codes() {
        for bad in ["", "02.1", "KK2", "K0", "K02.", "K02.12345", "K0.21", "K02-1"] {
            assert!(Icd10Code::parse(bad).is_err(), "accepted {bad:?}");
        }
    }
}
