//! The sizes a [`crate::QueueManager`] can be constructed with.
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::QueueError;

/// The maximum number of jobs a queue admits.
///
/// Only a small set of sizes is allowed. Use [`Capacity::try_from`] to validate an arbitrary
/// number.
///
/// ```
/// use fnqueue::Capacity;
///
/// assert_eq!(Capacity::try_from(15).unwrap(), Capacity::Fifteen);
/// assert!(Capacity::try_from(4).is_err());
/// assert_eq!(Capacity::default().get(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum Capacity {
    One,
    Two,
    Three,
    Five,
    #[default]
    Ten,
    Fifteen,
    Twenty,
}

impl Capacity {
    pub const ALL: [Capacity; 7] = [
        Capacity::One,
        Capacity::Two,
        Capacity::Three,
        Capacity::Five,
        Capacity::Ten,
        Capacity::Fifteen,
        Capacity::Twenty,
    ];

    pub const fn get(self) -> usize {
        match self {
            Capacity::One => 1,
            Capacity::Two => 2,
            Capacity::Three => 3,
            Capacity::Five => 5,
            Capacity::Ten => 10,
            Capacity::Fifteen => 15,
            Capacity::Twenty => 20,
        }
    }
}

impl TryFrom<usize> for Capacity {
    type Error = QueueError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|capacity| capacity.get() == value)
            .ok_or(QueueError::InvalidCapacity(value))
    }
}

impl From<Capacity> for usize {
    fn from(value: Capacity) -> Self {
        value.get()
    }
}

impl Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn allowed_sizes_round_trip() {
        for capacity in Capacity::ALL {
            assert_eq!(Capacity::try_from(capacity.get()).unwrap(), capacity);
        }
    }

    #[test]
    fn other_sizes_are_rejected() {
        for value in [0, 4, 6, 11, 21, 100] {
            assert_matches!(
                Capacity::try_from(value),
                Err(QueueError::InvalidCapacity(v)) if v == value
            );
        }
    }

    #[test]
    fn deserialize_validates() {
        assert_eq!(
            serde_json::from_str::<Capacity>("20").unwrap(),
            Capacity::Twenty
        );
        assert!(serde_json::from_str::<Capacity>("7").is_err());
        assert_eq!(serde_json::to_string(&Capacity::Five).unwrap(), "5");
    }
}
