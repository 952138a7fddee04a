//! Field bindings: durable links between an owner's field and a
//! dynamically resolved value.
//!
//! The resolver keeps an explicit side table keyed by a stable owner
//! identifier, with lifecycle tied to the owner's container: entries are
//! removed via `remove_owner` when an owner is disposed, and migrated via
//! `replace_owner` when a provisional owner is promoted to a durable one.

use std::collections::HashMap;
use std::sync::Arc;

use super::candle::{index_of, Candle, TimestampMs};
use super::error::GridtraderError;

/// Stable identity assigned to each bindable owner by its container.
pub type OwnerId = u64;

/// Value transform applied after resolution, e.g. a percentage offset.
pub type Transform = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// An owner whose named fields can be written by the resolver.
pub trait BindOwner {
    fn owner_id(&self) -> OwnerId;

    /// Whether the owner has a durable identity yet. `save_bindings`
    /// refuses owners that have not been persisted.
    fn is_persisted(&self) -> bool;

    fn set_bound_field(&mut self, field: &str, value: f64) -> Result<(), GridtraderError>;
}

/// Source of bindable values. Declares its key set up front; binding an
/// undeclared key is rejected.
pub trait BindSource {
    fn bindable_keys(&self) -> &[&'static str];

    fn bind_value(
        &self,
        key: &str,
        timestamp_context: Option<TimestampMs>,
    ) -> Result<f64, GridtraderError>;
}

#[derive(Clone)]
pub struct Binding {
    pub owner: OwnerId,
    pub field: String,
    pub bind_key: String,
    pub transform: Option<Transform>,
    pub timestamp_context: Option<TimestampMs>,
    pub finalized: bool,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .field("bind_key", &self.bind_key)
            .field("has_transform", &self.transform.is_some())
            .field("timestamp_context", &self.timestamp_context)
            .field("finalized", &self.finalized)
            .finish()
    }
}

/// Side table of bindings per owner, unique per (owner, field).
pub struct BindingResolver<S: BindSource> {
    source: S,
    table: HashMap<OwnerId, HashMap<String, Binding>>,
}

impl<S: BindSource> BindingResolver<S> {
    pub fn new(source: S) -> Self {
        BindingResolver {
            source,
            table: HashMap::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve `bind_key` (optionally through `transform`), write it to
    /// `owner.field`, and create or reuse the Binding for (owner, field).
    pub fn bind(
        &mut self,
        owner: &mut dyn BindOwner,
        field: &str,
        bind_key: &str,
        transform: Option<Transform>,
        timestamp_context: Option<TimestampMs>,
    ) -> Result<&Binding, GridtraderError> {
        if !self.source.bindable_keys().contains(&bind_key) {
            return Err(GridtraderError::InvalidArgument {
                reason: format!("'{}' is not bindable through this resolver", bind_key),
            });
        }

        let raw = self.source.bind_value(bind_key, timestamp_context)?;
        let value = match &transform {
            Some(t) => t(raw),
            None => raw,
        };
        owner.set_bound_field(field, value)?;

        let owner_id = owner.owner_id();
        let fields = self.table.entry(owner_id).or_default();
        let binding = match fields.entry(field.to_string()) {
            std::collections::hash_map::Entry::Occupied(slot) => {
                let binding = slot.into_mut();
                binding.bind_key = bind_key.to_string();
                binding.transform = transform;
                binding.timestamp_context = timestamp_context;
                binding
            }
            std::collections::hash_map::Entry::Vacant(slot) => slot.insert(Binding {
                owner: owner_id,
                field: field.to_string(),
                bind_key: bind_key.to_string(),
                transform,
                timestamp_context,
                finalized: false,
            }),
        };
        Ok(binding)
    }

    /// Finalize the owner's pending bindings against its durable identity.
    /// A LogicError for owners that have not been persisted yet.
    pub fn save_bindings(&mut self, owner: &dyn BindOwner) -> Result<(), GridtraderError> {
        if !owner.is_persisted() {
            return Err(GridtraderError::LogicError {
                reason: format!(
                    "cannot save bindings for unpersisted owner {}",
                    owner.owner_id()
                ),
            });
        }
        if let Some(fields) = self.table.get_mut(&owner.owner_id()) {
            for binding in fields.values_mut() {
                binding.finalized = true;
            }
        }
        Ok(())
    }

    /// Migrate all bindings from `current` to `new`, preserving field
    /// associations, keys and transforms. Promotes a provisional owner to
    /// a durable one without losing its bindings.
    pub fn replace_owner(&mut self, current: OwnerId, new: OwnerId) {
        if let Some(mut fields) = self.table.remove(&current) {
            for binding in fields.values_mut() {
                binding.owner = new;
            }
            self.table.insert(new, fields);
        }
    }

    /// Drop an owner's entries when it is disposed; the table must not
    /// outlive the owners it references.
    pub fn remove_owner(&mut self, owner: OwnerId) {
        self.table.remove(&owner);
    }

    pub fn bindings_for(&self, owner: OwnerId) -> Option<&HashMap<String, Binding>> {
        self.table.get(&owner)
    }
}

/// Candle-backed bind source: OHLCV fields at a timestamp context.
pub struct CandleBindSource<'a> {
    candles: &'a [Candle],
}

const CANDLE_KEYS: [&str; 5] = ["open", "high", "low", "close", "volume"];

impl<'a> CandleBindSource<'a> {
    pub fn new(candles: &'a [Candle]) -> Self {
        CandleBindSource { candles }
    }
}

impl BindSource for CandleBindSource<'_> {
    fn bindable_keys(&self) -> &[&'static str] {
        &CANDLE_KEYS
    }

    fn bind_value(
        &self,
        key: &str,
        timestamp_context: Option<TimestampMs>,
    ) -> Result<f64, GridtraderError> {
        let timestamp = timestamp_context.ok_or_else(|| GridtraderError::InvalidArgument {
            reason: format!("binding '{}' requires a timestamp context", key),
        })?;
        let idx = index_of(self.candles, timestamp).ok_or_else(|| GridtraderError::Data {
            reason: format!("no candle at timestamp {}", timestamp),
        })?;
        self.candles[idx]
            .field(key)
            .ok_or_else(|| GridtraderError::InvalidArgument {
                reason: format!("unknown candle field '{}'", key),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestOwner {
        id: OwnerId,
        persisted: bool,
        fields: HashMap<String, f64>,
    }

    impl TestOwner {
        fn new(id: OwnerId, persisted: bool) -> Self {
            TestOwner {
                id,
                persisted,
                fields: HashMap::new(),
            }
        }
    }

    impl BindOwner for TestOwner {
        fn owner_id(&self) -> OwnerId {
            self.id
        }

        fn is_persisted(&self) -> bool {
            self.persisted
        }

        fn set_bound_field(&mut self, field: &str, value: f64) -> Result<(), GridtraderError> {
            self.fields.insert(field.to_string(), value);
            Ok(())
        }
    }

    fn make_candles() -> Vec<Candle> {
        (0..3)
            .map(|i| Candle {
                symbol: "TEST".into(),
                interval: "1h".into(),
                timestamp: 1000 * (i + 1),
                open: 10.0 + i as f64,
                high: 12.0 + i as f64,
                low: 9.0 + i as f64,
                close: 11.0 + i as f64,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn bind_resolves_transforms_and_writes_field() {
        let candles = make_candles();
        let mut resolver = BindingResolver::new(CandleBindSource::new(&candles));
        let mut owner = TestOwner::new(1, false);

        let double: Transform = Arc::new(|v| v * 2.0);
        let binding = resolver
            .bind(&mut owner, "target_price", "close", Some(double), Some(2000))
            .unwrap();

        assert_eq!(binding.bind_key, "close");
        assert!(!binding.finalized);
        // close at 2000 is 12.0, doubled.
        assert!((owner.fields["target_price"] - 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn undeclared_key_is_rejected() {
        let candles = make_candles();
        let mut resolver = BindingResolver::new(CandleBindSource::new(&candles));
        let mut owner = TestOwner::new(1, false);

        let err = resolver
            .bind(&mut owner, "x", "vwap", None, Some(1000))
            .unwrap_err();
        assert!(matches!(err, GridtraderError::InvalidArgument { .. }));
        assert!(resolver.bindings_for(1).is_none());
    }

    #[test]
    fn missing_candle_is_a_data_error() {
        let candles = make_candles();
        let mut resolver = BindingResolver::new(CandleBindSource::new(&candles));
        let mut owner = TestOwner::new(1, false);

        let err = resolver
            .bind(&mut owner, "x", "close", None, Some(9999))
            .unwrap_err();
        assert!(matches!(err, GridtraderError::Data { .. }));
    }

    #[test]
    fn rebinding_same_field_reuses_binding() {
        let candles = make_candles();
        let mut resolver = BindingResolver::new(CandleBindSource::new(&candles));
        let mut owner = TestOwner::new(1, false);

        resolver
            .bind(&mut owner, "stop_price", "low", None, Some(1000))
            .unwrap();
        resolver
            .bind(&mut owner, "stop_price", "close", None, Some(2000))
            .unwrap();

        let fields = resolver.bindings_for(1).unwrap();
        assert_eq!(fields.len(), 1);
        let binding = &fields["stop_price"];
        assert_eq!(binding.bind_key, "close");
        assert_eq!(binding.timestamp_context, Some(2000));
        assert!((owner.fields["stop_price"] - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn save_bindings_requires_persistence() {
        let candles = make_candles();
        let mut resolver = BindingResolver::new(CandleBindSource::new(&candles));
        let mut owner = TestOwner::new(1, false);
        resolver
            .bind(&mut owner, "entry_price", "close", None, Some(1000))
            .unwrap();

        let err = resolver.save_bindings(&owner).unwrap_err();
        assert!(matches!(err, GridtraderError::LogicError { .. }));

        owner.persisted = true;
        resolver.save_bindings(&owner).unwrap();
        assert!(resolver.bindings_for(1).unwrap()["entry_price"].finalized);
    }

    #[test]
    fn replace_owner_migrates_bindings() {
        let candles = make_candles();
        let mut resolver = BindingResolver::new(CandleBindSource::new(&candles));
        let mut provisional = TestOwner::new(1, false);

        let plus_one: Transform = Arc::new(|v| v + 1.0);
        resolver
            .bind(&mut provisional, "entry_price", "open", Some(plus_one), Some(1000))
            .unwrap();

        resolver.replace_owner(1, 42);
        assert!(resolver.bindings_for(1).is_none());

        let migrated = resolver.bindings_for(42).unwrap();
        let binding = &migrated["entry_price"];
        assert_eq!(binding.owner, 42);
        assert_eq!(binding.bind_key, "open");
        // The transform rides along with the migrated binding.
        assert!((binding.transform.as_ref().unwrap()(10.0) - 11.0).abs() < f64::EPSILON);
    }

    #[test]
    fn remove_owner_drops_entries() {
        let candles = make_candles();
        let mut resolver = BindingResolver::new(CandleBindSource::new(&candles));
        let mut owner = TestOwner::new(7, true);
        resolver
            .bind(&mut owner, "entry_price", "close", None, Some(1000))
            .unwrap();

        resolver.remove_owner(7);
        assert!(resolver.bindings_for(7).is_none());
    }
}
