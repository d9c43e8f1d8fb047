//! Turns whatever is stored in the `embedding` column into a usable vector.

use serde_json::Value;

use crate::models::EmbeddingVector;

/// Why a stored embedding could not be used. Rejections never leave the
/// scanner; they only show up in debug logs.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Missing,
    NotASequence,
    NonNumeric {
        index: usize,
    },
    NonFinite {
        index: usize,
    },
    Unparsable {
        index: usize,
    },
}

pub fn validate(raw: Option<&Value>) -> Result<EmbeddingVector, Rejection> {
    match raw {
        None | Some(Value::Null) => Err(Rejection::Missing),
        Some(Value::Array(items)) => from_array(items),
        Some(Value::String(text)) => from_text(text),
        Some(_) => Err(Rejection::NotASequence),
    }
}

fn from_array(items: &[Value]) -> Result<EmbeddingVector, Rejection> {
    let mut values = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let number = item.as_f64().ok_or(Rejection::NonNumeric { index })?;
        values.push(finite(number, index)?);
    }
    Ok(EmbeddingVector::new(values))
}

// Some stores hand vectors back as text, e.g. pgvector's "[0.1,0.2]".
fn from_text(text: &str) -> Result<EmbeddingVector, Rejection> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or(Rejection::NotASequence)?;

    if inner.trim().is_empty() {
        return Ok(EmbeddingVector::new(Vec::new()));
    }

    let mut values = Vec::new();
    for (index, part) in inner.split(',').enumerate() {
        let number = part
            .trim()
            .parse::<f64>()
            .map_err(|_| Rejection::Unparsable { index })?;
        values.push(finite(number, index)?);
    }
    Ok(EmbeddingVector::new(values))
}

fn finite(number: f64, index: usize) -> Result<f32, Rejection> {
    let narrowed = number as f32;
    if narrowed.is_finite() {
        Ok(narrowed)
    } else {
        Err(Rejection::NonFinite { index })
    }
}
