//! Availability reads and booking admission.

pub mod admission;
pub mod clock;
pub mod locks;
pub mod resolver;

pub use admission::AdmissionController;
pub use clock::{Clock, FixedClock, ZonedClock};
pub use locks::SlotLocks;
pub use resolver::AvailabilityResolver;
