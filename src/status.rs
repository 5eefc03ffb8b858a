use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    Hit,
    PartialHit,
    RangeMiss,
    KeyMiss,
    Revalidated,
    Proxied,
    Error,
}

impl LookupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LookupStatus::Hit => "HIT",
            LookupStatus::PartialHit => "PART_HIT",
            LookupStatus::RangeMiss => "RANGE_MISS",
            LookupStatus::KeyMiss => "KEY_MISS",
            LookupStatus::Revalidated => "REVALIDATE_HIT",
            LookupStatus::Proxied => "PROXY",
            LookupStatus::Error => "ERROR",
        }
    }

    pub fn is_hit(self) -> bool {
        matches!(self, LookupStatus::Hit | LookupStatus::Revalidated)
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
