use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// Number of results returned when a search does not ask for a usable limit.
pub const DEFAULT_LIMIT: usize = 5;

/// A row as it comes back from the record store, before any validation.
///
/// `embedding` holds whatever the column contains; it is only validated
/// during the scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub content: Option<String>,
    pub embedding: Option<Value>,
}

/// A validated, finite embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScoredResult {
    pub id: String,
    pub content: Option<String>,
    pub similarity: f64,
}

/// Requested result count after normalisation. Anything that is not a
/// positive integer falls back to [`DEFAULT_LIMIT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimit(usize);

impl SearchLimit {
    pub fn new(limit: usize) -> Self {
        if limit == 0 { Self::default() } else { Self(limit) }
    }

    pub fn from_json(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::Number(n)) =>
                n
                    .as_u64()
                    .or_else(|| n.as_f64().and_then(whole_number))
                    .and_then(|n| usize::try_from(n).ok())
                    .map(Self::new)
                    .unwrap_or_default(),
            Some(Value::String(s)) => Self::parse(s),
            _ => Self::default(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        raw.trim().parse::<usize>().map(Self::new).unwrap_or_default()
    }

    pub fn get(self) -> usize {
        self.0
    }
}

// JSON clients send `3.0` or `1e1` for integers; treat those as 3 and 10.
fn whole_number(value: f64) -> Option<u64> {
    (value.is_finite() && value > 0.0 && value.fract() == 0.0 && value <= (u64::MAX as f64))
        .then_some(value as u64)
}

impl Default for SearchLimit {
    fn default() -> Self {
        Self(DEFAULT_LIMIT)
    }
}

/// Whether the embedding computed by an ingest call made it into the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Persistence {
    Stored {
        id: String,
    },
    Failed {
        reason: String,
    },
}

/// Result of an ingest call. The embedding is always present; durability is
/// reported separately so callers can tell "computed but not saved" apart
/// from a hard failure.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub embedding: EmbeddingVector,
    pub persistence: Persistence,
}

impl IngestOutcome {
    pub fn id(&self) -> Option<&str> {
        match &self.persistence {
            Persistence::Stored { id } => Some(id),
            Persistence::Failed { .. } => None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.persistence, Persistence::Stored { .. })
    }
}
