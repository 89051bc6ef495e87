//! Sample-based type inference.

use std::collections::HashMap;

use crate::types::{Cell, FieldType};

use super::field::Field;

/// Default fraction of non-missing sample cells a candidate type must cast.
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

/// Knobs for [`infer_fields`].
#[derive(Debug, Clone)]
pub struct InferOptions {
    pub confidence: f64,
    pub missing_values: Vec<String>,
    /// Skip inference and give every field this type.
    pub field_type: Option<FieldType>,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            missing_values: vec![String::new()],
            field_type: None,
        }
    }
}

/// Turn raw header labels into unique, non-blank field names.
///
/// Blank labels become `field{n}` (1-based position); repeated names get a suffix with the
/// repetition count (`id`, `id2`, `id3`).
pub fn normalize_names(labels: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    labels
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let base = if label.trim().is_empty() {
                format!("field{}", index + 1)
            } else {
                label.clone()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}{count}")
            }
        })
        .collect()
}

struct Runner {
    field: Field,
    score: i64,
}

/// Infer one field per name from a sample of raw rows.
///
/// Each column keeps a running score per candidate type (most specific first). A cast
/// success adds one, a failure subtracts one; candidates whose score drops below
/// `len(sample) * (confidence - 1)` stop being tried. The first candidate reaching
/// `max_score * confidence` wins, where `max_score` is the sample size minus the missing
/// cells seen so far. Columns without a winner fall back to `any`.
pub fn infer_fields(names: &[String], sample: &[Vec<Cell>], options: &InferOptions) -> Vec<Field> {
    if let Some(field_type) = options.field_type {
        return names.iter().map(|name| Field::new(name.clone(), field_type)).collect();
    }

    let size = sample.len() as i64;
    let floor = size as f64 * (options.confidence - 1.0);
    let mut max_score = vec![size; names.len()];
    let mut runners: Vec<Vec<Runner>> = names
        .iter()
        .map(|name| {
            FieldType::INFERENCE_ORDER
                .iter()
                .map(|&t| Runner {
                    field: Field::new(name.clone(), t),
                    score: 0,
                })
                .collect()
        })
        .collect();
    let mut chosen: Vec<Option<FieldType>> = vec![None; names.len()];

    for cells in sample {
        for index in 0..names.len() {
            if chosen[index].is_some() {
                continue;
            }
            let cell = cells.get(index).unwrap_or(&Cell::Null);
            if is_missing(cell, &options.missing_values) {
                max_score[index] -= 1;
                continue;
            }
            for runner in runners[index].iter_mut() {
                if (runner.score as f64) < floor {
                    continue;
                }
                runner.score += if runner.field.cast_only(cell).is_some() { 1 } else { -1 };
                if max_score[index] > 0
                    && runner.score as f64 >= max_score[index] as f64 * options.confidence
                {
                    chosen[index] = Some(runner.field.field_type());
                    break;
                }
            }
        }
    }

    // Trailing missing cells can lower max_score after the last cast; settle those columns.
    for (index, slot) in chosen.iter_mut().enumerate() {
        if slot.is_none() && max_score[index] > 0 {
            let threshold = max_score[index] as f64 * options.confidence;
            *slot = runners[index]
                .iter()
                .find(|r| r.score as f64 >= threshold)
                .map(|r| r.field.field_type());
        }
    }

    names
        .iter()
        .zip(chosen)
        .map(|(name, t)| Field::new(name.clone(), t.unwrap_or(FieldType::Any)))
        .collect()
}

fn is_missing(cell: &Cell, missing_values: &[String]) -> bool {
    match cell {
        Cell::Null => true,
        Cell::String(s) => missing_values.iter().any(|m| m == s),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<Cell>> {
        data.iter()
            .map(|r| r.iter().map(|c| json!(c)).collect())
            .collect()
    }

    fn types(fields: &[Field]) -> Vec<FieldType> {
        fields.iter().map(Field::field_type).collect()
    }

    #[test]
    fn infers_most_specific_type() {
        let names = vec!["id".to_string(), "name".to_string(), "when".to_string()];
        let sample = rows(&[&["1", "english", "2020-01-01"], &["2", "中国人", "2021-02-03"]]);
        let fields = infer_fields(&names, &sample, &InferOptions::default());
        assert_eq!(
            types(&fields),
            vec![FieldType::Integer, FieldType::String, FieldType::Date]
        );
    }

    #[test]
    fn tolerates_noise_below_confidence() {
        let mut data: Vec<Vec<Cell>> = (0..19).map(|i| vec![json!(i.to_string())]).collect();
        data.push(vec![json!("oops")]);
        let fields = infer_fields(&["n".to_string()], &data, &InferOptions::default());
        assert_eq!(fields[0].field_type(), FieldType::Integer);

        let mut data: Vec<Vec<Cell>> = (0..5).map(|i| vec![json!(i.to_string())]).collect();
        data.extend((0..5).map(|_| vec![json!("x")]));
        let fields = infer_fields(&["n".to_string()], &data, &InferOptions::default());
        assert_eq!(fields[0].field_type(), FieldType::String);
    }

    #[test]
    fn missing_cells_do_not_count() {
        let sample = rows(&[&["1"], &[""], &["3"], &[""]]);
        let fields = infer_fields(&["n".to_string()], &sample, &InferOptions::default());
        assert_eq!(fields[0].field_type(), FieldType::Integer);
    }

    #[test]
    fn empty_sample_falls_back_to_any() {
        let fields = infer_fields(&["a".to_string()], &[], &InferOptions::default());
        assert_eq!(fields[0].field_type(), FieldType::Any);
    }

    #[test]
    fn boolean_beats_string() {
        let sample = rows(&[&["true"], &["false"], &["TRUE"]]);
        let fields = infer_fields(&["flag".to_string()], &sample, &InferOptions::default());
        assert_eq!(fields[0].field_type(), FieldType::Boolean);
    }

    #[test]
    fn names_are_deduplicated_and_filled() {
        let labels: Vec<String> = ["id", "", "id", "id"].iter().map(|s| s.to_string()).collect();
        assert_eq!(normalize_names(&labels), vec!["id", "field2", "id2", "id3"]);
    }
}
