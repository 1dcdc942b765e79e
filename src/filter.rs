use std::fmt;

use regex::Regex;

use crate::device::{Device, Devices};

type Predicate = dyn Fn(&Device, &str, &Devices) -> bool + Send + Sync;

/// Selects which devices end up in a snapshot.
///
/// Every variant boils down to the same predicate over `(device, identifier, all devices)`,
/// which is what the parsers are given.
#[derive(Default)]
pub enum DeviceFilter {
    /// Keep everything
    #[default]
    All,
    /// Keep devices whose identifier matches
    Regex(Regex),
    /// Keep the listed identifiers
    Ids(Vec<String>),
    Predicate(Box<Predicate>),
}

impl DeviceFilter {
    /// Filter on a regex over the device identifier.
    pub fn regex(pattern: &str) -> crate::Result<Self> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Device, &str, &Devices) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Box::new(f))
    }

    /// Whether the device should be kept.
    pub fn keep(&self, device: &Device, id: &str, all: &Devices) -> bool {
        match self {
            Self::All => true,
            Self::Regex(regex) => regex.is_match(id),
            Self::Ids(ids) => ids.iter().any(|x| x == id),
            Self::Predicate(f) => f(device, id, all),
        }
    }
}

impl fmt::Debug for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Regex(regex) => f.debug_tuple("Regex").field(regex).finish(),
            Self::Ids(ids) => f.debug_tuple("Ids").field(ids).finish(),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

impl From<Regex> for DeviceFilter {
    fn from(value: Regex) -> Self {
        Self::Regex(value)
    }
}
