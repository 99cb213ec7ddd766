//! Core aggregate and domain event traits.

use common::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// Used as the notification template name.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates persisted with optimistic concurrency.
///
/// Identifiers are assigned by storage, so a freshly constructed aggregate
/// has no id and sits at [`Version::initial`]. Every successful save moves
/// the version forward by one; a save carrying a stale version is rejected
/// by the repository.
pub trait Aggregate: Clone + Send + Sync {
    /// The identifier type storage assigns to this aggregate.
    type Id: Copy + Eq + std::hash::Hash + std::fmt::Display + Send + Sync + From<i64>;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier, or None before it is first stored.
    fn id(&self) -> Option<Self::Id>;

    /// Returns the version this copy of the aggregate was loaded at.
    fn version(&self) -> Version;

    /// Sets the aggregate version. Called by repositories after a save.
    fn set_version(&mut self, version: Version);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TestEvent {
        Created { id: i64 },
        Renamed { name: String },
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Created { .. } => "test_created",
                TestEvent::Renamed { .. } => "test_renamed",
            }
        }
    }

    #[derive(Debug, Default, Clone)]
    struct TestAggregate {
        id: Option<common::OrderId>,
        version: Version,
    }

    impl Aggregate for TestAggregate {
        type Id = common::OrderId;

        fn aggregate_type() -> &'static str {
            "TestAggregate"
        }

        fn id(&self) -> Option<Self::Id> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }
    }

    #[test]
    fn test_domain_event_type() {
        assert_eq!(TestEvent::Created { id: 1 }.event_type(), "test_created");
        let event = TestEvent::Renamed {
            name: "x".to_string(),
        };
        assert_eq!(event.event_type(), "test_renamed");
    }

    #[test]
    fn test_new_aggregate_is_unsaved() {
        let mut aggregate = TestAggregate::default();
        assert!(aggregate.id().is_none());
        assert_eq!(aggregate.version(), Version::initial());

        aggregate.set_version(Version::first());
        assert_eq!(aggregate.version(), Version::first());
        assert_eq!(TestAggregate::aggregate_type(), "TestAggregate");
    }
}
