use crate::TextError;

/// Whether a tooth belongs to the permanent or the primary (deciduous) set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dentition {
    Permanent,
    Primary,
}

/// A tooth identified by FDI two-digit notation.
///
/// The first digit is the quadrant (1-4 permanent, 5-8 primary), the second the
/// position counted from the midline (1-8 permanent, 1-5 primary). `11` is the
/// upper right permanent central incisor, `85` the lower right primary second molar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToothNumber(u8);

impl ToothNumber {
    pub fn new(value: i64) -> Result<Self, TextError> {
        let invalid = || TextError::InvalidTooth(value.to_string());
        let value = u8::try_from(value).map_err(|_| invalid())?;
        let quadrant = value / 10;
        let position = value % 10;
        let max_position = match quadrant {
            1..=4 => 8,
            5..=8 => 5,
            _ => return Err(invalid()),
        };
        if position == 0 || position > max_position {
            return Err(invalid());
        }
        Ok(Self(value))
    }

    pub fn parse(input: &str) -> Result<Self, TextError> {
        let trimmed = input.trim();
        if trimmed.len() != 2 {
            return Err(TextError::InvalidTooth(trimmed.to_string()));
        }
        let value: i64 = trimmed
            .parse()
            .map_err(|_| TextError::InvalidTooth(trimmed.to_string()))?;
        Self::new(value)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn quadrant(self) -> u8 {
        self.0 / 10
    }

    pub fn position(self) -> u8 {
        self.0 % 10
    }

    pub fn dentition(self) -> Dentition {
        if self.quadrant() <= 4 {
            Dentition::Permanent
        } else {
            Dentition::Primary
        }
    }
}

impl std::fmt::Display for ToothNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for ToothNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ToothNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        ToothNumber::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_permanent_and_primary_teeth() {
        let incisor = ToothNumber::new(11).unwrap();
        assert_eq!(incisor.quadrant(), 1);
        assert_eq!(incisor.position(), 1);
        assert_eq!(incisor.dentition(), Dentition::Permanent);

        let molar = ToothNumber::new(48).unwrap();
        assert_eq!(molar.dentition(), Dentition::Permanent);

        let primary = ToothNumber::new(85).unwrap();
        assert_eq!(primary.dentition(), Dentition::Primary);
    }

    #[test]
    fn test_rejects_out_of_range_positions() {
        for bad in [0, 9, 10, 19, 49, 56, 90, 100, -11, 300] {
            assert!(ToothNumber::new(bad).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_parse_requires_two_digits() {
        assert_eq!(ToothNumber::parse("36").unwrap().value(), 36);
        assert!(ToothNumber::parse("036").is_err());
        assert!(ToothNumber::parse("3").is_err());
        assert!(ToothNumber::parse("ab").is_err());
    }
}
