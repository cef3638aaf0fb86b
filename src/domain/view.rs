//! View models and their merge policies.
//!
//! A `ViewState` is the consumer-facing value of one feed. It is only
//! mutated through the methods here, driven by the owning reconciler.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::error::SyncError;

/// How push messages fold into a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Newest-first sequence capped at `capacity`.
    RingBuffer {
        /// Maximum retained entries.
        capacity: usize,
    },
    /// Each accepted payload replaces the value wholesale.
    Replace,
    /// Payload stored under the key of the channel it arrived on.
    KeyedUpsert,
}

/// Container shape a payload must have to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadShape {
    /// Any JSON value.
    #[default]
    Any,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl PayloadShape {
    /// Whether `value` has this shape.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// The data held by a view, one variant per merge policy.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewData {
    /// Ring buffer, newest first.
    Ring(VecDeque<Value>),
    /// Latest wholesale value.
    Snapshot(Option<Value>),
    /// Per-key wholesale values.
    Keyed(BTreeMap<String, Value>),
}

impl ViewData {
    /// Empty data for a policy.
    pub fn empty(policy: MergePolicy) -> Self {
        match policy {
            MergePolicy::RingBuffer { capacity } => Self::Ring(VecDeque::with_capacity(capacity)),
            MergePolicy::Replace => Self::Snapshot(None),
            MergePolicy::KeyedUpsert => Self::Keyed(BTreeMap::new()),
        }
    }

    /// Number of entries (0 or 1 for snapshots).
    pub fn len(&self) -> usize {
        match self {
            Self::Ring(entries) => entries.len(),
            Self::Snapshot(value) => usize::from(value.is_some()),
            Self::Keyed(map) => map.len(),
        }
    }

    /// Whether nothing has been received yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer-facing state of one feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// Folded data.
    pub data: ViewData,
    /// A seeding snapshot is still outstanding.
    pub loading: bool,
    /// Last snapshot failure, shown inline by consumers.
    pub error: Option<SyncError>,
    /// Incremented on every applied change.
    pub revision: u64,
    /// Wall-clock time of the last applied change.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ViewState {
    /// Empty view for `policy`.
    pub fn new(policy: MergePolicy, loading: bool) -> Self {
        Self {
            data: ViewData::empty(policy),
            loading,
            error: None,
            revision: 0,
            updated_at: None,
        }
    }

    /// Ring entries, newest first.
    pub const fn entries(&self) -> Option<&VecDeque<Value>> {
        match &self.data {
            ViewData::Ring(entries) => Some(entries),
            _ => None,
        }
    }

    /// Latest wholesale value.
    pub const fn value(&self) -> Option<&Value> {
        match &self.data {
            ViewData::Snapshot(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Keyed entries.
    pub const fn keyed(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.data {
            ViewData::Keyed(map) => Some(map),
            _ => None,
        }
    }

    /// Fold one accepted push payload. Returns whether the view changed.
    ///
    /// `key` is required for keyed views and ignored otherwise.
    pub fn apply_push(
        &mut self,
        policy: MergePolicy,
        shape: PayloadShape,
        key: Option<&str>,
        payload: Value,
    ) -> bool {
        let changed = match (&mut self.data, policy) {
            (ViewData::Ring(entries), MergePolicy::RingBuffer { capacity }) => {
                entries.push_front(payload);
                entries.truncate(capacity);
                true
            }
            (ViewData::Snapshot(value), MergePolicy::Replace) => {
                if shape.matches(&payload) {
                    *value = Some(payload);
                    true
                } else {
                    false
                }
            }
            (ViewData::Keyed(map), MergePolicy::KeyedUpsert) => match key {
                Some(key) if shape.matches(&payload) => {
                    map.insert(key.to_string(), payload);
                    true
                }
                _ => false,
            },
            _ => false,
        };

        if changed {
            self.touch();
        }
        changed
    }

    /// Seed the view from a snapshot response.
    ///
    /// Ring snapshots are newest-first arrays placed behind any pushes
    /// that already arrived. Replace snapshots overwrite. Keyed snapshots
    /// are objects whose entries fill keys no push has written yet.
    pub fn apply_snapshot(&mut self, policy: MergePolicy, shape: PayloadShape, snapshot: Value) {
        self.loading = false;

        let outcome = match (&mut self.data, policy) {
            (ViewData::Ring(entries), MergePolicy::RingBuffer { capacity }) => match snapshot {
                Value::Array(items) => {
                    entries.extend(items);
                    entries.truncate(capacity);
                    Ok(())
                }
                other => Err(shape_error("array", &other)),
            },
            (ViewData::Snapshot(value), MergePolicy::Replace) => {
                if shape.matches(&snapshot) {
                    *value = Some(snapshot);
                    Ok(())
                } else {
                    Err(shape_error("expected container", &snapshot))
                }
            }
            (ViewData::Keyed(map), MergePolicy::KeyedUpsert) => match snapshot {
                Value::Object(items) => {
                    for (key, item) in items {
                        if shape.matches(&item) {
                            map.entry(key).or_insert(item);
                        }
                    }
                    Ok(())
                }
                other => Err(shape_error("object", &other)),
            },
            _ => Err(SyncError::Protocol("view does not match merge policy".to_string())),
        };

        self.error = outcome.err();
        self.touch();
    }

    /// Record a snapshot failure without discarding pushed data.
    pub fn fail(&mut self, error: SyncError) {
        self.loading = false;
        self.error = Some(error);
        self.touch();
    }

    /// Drop one key of a keyed view. Returns whether it existed.
    pub fn remove_key(&mut self, key: &str) -> bool {
        let removed = match &mut self.data {
            ViewData::Keyed(map) => map.remove(key).is_some(),
            _ => false,
        };
        if removed {
            self.touch();
        }
        removed
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Some(Utc::now());
    }
}

fn shape_error(expected: &str, got: &Value) -> SyncError {
    let kind = match got {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    SyncError::Protocol(format!("snapshot: {expected} required, got {kind}"))
}
