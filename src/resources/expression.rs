//! Compact resource expression parsing.
//!
//! Allocation files write resource quantities as `"<mem>mb,<cores>vcores"`.
//! The two components may appear in either order and the unit suffixes are
//! case-insensitive. Anything else is malformed.

use serde::Serialize;

use crate::error::AllocationConfigError;

/// A two-dimensional resource quantity: memory in megabytes and virtual
/// cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub memory_mb: u64,
    pub vcores: u64,
}

impl Resource {
    /// The zero resource, used as the implicit minimum for every queue.
    pub const ZERO: Resource = Resource {
        memory_mb: 0,
        vcores: 0,
    };

    pub fn new(memory_mb: u64, vcores: u64) -> Self {
        Self { memory_mb, vcores }
    }

    /// The unbounded sentinel used when no maximum is configured anywhere.
    pub fn unbounded() -> Self {
        Self {
            memory_mb: u64::MAX,
            vcores: u64::MAX,
        }
    }

    /// Componentwise minimum, used to cap a child's effective maximum by
    /// its parent's `maxChildResources`.
    pub fn min(self, other: Resource) -> Resource {
        Resource {
            memory_mb: self.memory_mb.min(other.memory_mb),
            vcores: self.vcores.min(other.vcores),
        }
    }

    /// Parse an expression like `"2048mb,10vcores"` or `"10vcores, 2048mb"`.
    pub fn parse(text: &str) -> Result<Resource, AllocationConfigError> {
        let malformed = || AllocationConfigError::MalformedResourceExpression(text.to_string());

        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(malformed());
        }

        let mut memory_mb = None;
        let mut vcores = None;
        for part in parts {
            let lower = part.to_ascii_lowercase();
            if let Some(quantity) = lower.strip_suffix("mb") {
                if memory_mb.replace(parse_quantity(quantity).ok_or_else(malformed)?).is_some() {
                    return Err(malformed());
                }
            } else if let Some(quantity) = lower.strip_suffix("vcores") {
                if vcores.replace(parse_quantity(quantity).ok_or_else(malformed)?).is_some() {
                    return Err(malformed());
                }
            } else {
                return Err(malformed());
            }
        }

        match (memory_mb, vcores) {
            (Some(memory_mb), Some(vcores)) => Ok(Resource { memory_mb, vcores }),
            _ => Err(malformed()),
        }
    }
}

/// Parse the numeric half of a component. Negative quantities are rejected
/// by virtue of `u64` parsing; surrounding whitespace is tolerated.
fn parse_quantity(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_first() {
        let r = Resource::parse("2048mb,10vcores").unwrap();
        assert_eq!(r, Resource::new(2048, 10));
    }

    #[test]
    fn parses_either_order_and_case() {
        let r = Resource::parse("10VCORES, 2048MB").unwrap();
        assert_eq!(r, Resource::new(2048, 10));
    }

    #[test]
    fn tolerates_inner_whitespace() {
        let r = Resource::parse(" 1024mb , 0vcores ").unwrap();
        assert_eq!(r, Resource::new(1024, 0));
    }

    #[test]
    fn rejects_missing_component() {
        assert!(Resource::parse("2048mb").is_err());
    }

    #[test]
    fn rejects_duplicate_component() {
        assert!(Resource::parse("2048mb,1024mb").is_err());
    }

    #[test]
    fn rejects_negative_quantity() {
        assert!(Resource::parse("-1mb,10vcores").is_err());
    }

    #[test]
    fn rejects_non_numeric_quantity() {
        assert!(Resource::parse("lotsmb,10vcores").is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(Resource::parse("2048gb,10vcores").is_err());
    }

    #[test]
    fn min_is_componentwise() {
        let a = Resource::new(4096, 10);
        let b = Resource::new(2048, 64);
        assert_eq!(a.min(b), Resource::new(2048, 10));
    }
}
