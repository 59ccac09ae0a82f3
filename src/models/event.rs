//! Hardware events carried by the `management_signal` marker.

use std::fmt::{Display, Formatter};

/// Sensor-driven event that triggers the classification job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareEvent {
    /// An item was placed into the appliance.
    ItemIn,
    /// An item was taken out of the appliance.
    ItemOut,
}

impl HardwareEvent {
    /// Every recognized event, in wire order.
    pub const ALL: [Self; 2] = [Self::ItemIn, Self::ItemOut];

    /// Payload string written into the marker by MainStage.
    #[must_use]
    pub const fn payload(self) -> &'static str {
        match self {
            Self::ItemIn => "In button clicked",
            Self::ItemOut => "Out button clicked",
        }
    }

    /// Parse a marker payload. Surrounding whitespace is ignored.
    #[must_use]
    pub fn from_payload(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::ALL.into_iter().find(|event| event.payload() == trimmed)
    }
}

impl Display for HardwareEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.payload())
    }
}
