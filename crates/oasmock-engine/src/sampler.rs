//! Narrowed schema → concrete `serde_json::Value`
//!
//! Handles the OpenAPI 3.0 subset the narrowing engine produces:
//! string, integer, number, boolean, array (list and tuple), object, enum,
//! anyOf, oneOf, allOf. Schemas are expected to be closed (refs inlined); a
//! leftover `$ref` samples as `null`.

use std::sync::{Mutex, PoisonError};

use oasmock_core::{Config, SamplerConfig};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};

/// Maximum recursion depth for schema traversal.
const MAX_DEPTH: u32 = 20;

/// Produces a value consistent with a schema.
pub trait SchemaSampler: Send + Sync {
    fn sample(&self, schema: &Value) -> Value;
}

impl<F> SchemaSampler for F
where
    F: Fn(&Value) -> Value + Send + Sync,
{
    fn sample(&self, schema: &Value) -> Value {
        self(schema)
    }
}

/// The default sampler: random values within the schema's bounds.
#[derive(Debug)]
pub struct RandomSampler {
    rng: Mutex<SmallRng>,
    limits: SamplerConfig,
}

impl RandomSampler {
    /// Entropy-seeded sampler with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_entropy()),
            limits: SamplerConfig::default(),
        }
    }

    /// Deterministic sampler: the same seed yields the same values.
    #[must_use]
    pub fn seeded(seed: u64, limits: SamplerConfig) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
            limits,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            limits: config.sampler,
        }
    }
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaSampler for RandomSampler {
    fn sample(&self, schema: &Value) -> Value {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        generate(schema, &self.limits, &mut *rng)
    }
}

/// Generate a random JSON value conforming to the given schema.
pub fn generate(schema: &Value, limits: &SamplerConfig, rng: &mut impl Rng) -> Value {
    generate_inner(schema, limits, rng, 0)
}

fn generate_inner(schema: &Value, limits: &SamplerConfig, rng: &mut impl Rng, depth: u32) -> Value {
    if depth > MAX_DEPTH || schema.get("$ref").is_some() {
        return Value::Null;
    }

    if let Some(value) = schema.get("const") {
        return value.clone();
    }

    if let Some(enum_values) = schema.get("enum").and_then(Value::as_array) {
        if !enum_values.is_empty() {
            return enum_values[rng.gen_range(0..enum_values.len())].clone();
        }
    }

    // anyOf / oneOf: pick one non-null variant
    for key in ["anyOf", "oneOf"] {
        if let Some(variants) = schema.get(key).and_then(Value::as_array) {
            let non_null: Vec<_> = variants
                .iter()
                .filter(|s| s.get("type").and_then(Value::as_str) != Some("null"))
                .collect();
            if non_null.is_empty() {
                return Value::Null;
            }
            return generate_inner(
                non_null[rng.gen_range(0..non_null.len())],
                limits,
                rng,
                depth + 1,
            );
        }
    }

    // allOf: merge objects
    if let Some(all_of) = schema.get("allOf").and_then(Value::as_array) {
        let mut merged = Map::new();
        for sub in all_of {
            if let Value::Object(obj) = generate_inner(sub, limits, rng, depth + 1) {
                merged.extend(obj);
            }
        }
        return Value::Object(merged);
    }

    let type_str = schema.get("type").and_then(Value::as_str).unwrap_or("");
    match type_str {
        "string" => gen_string(schema, limits, rng),
        "integer" => gen_integer(schema, rng),
        "number" => gen_number(schema, rng),
        "boolean" => Value::Bool(rng.gen_bool(0.5)),
        "array" => gen_array(schema, limits, rng, depth + 1),
        "object" => gen_object(schema, limits, rng, depth + 1),
        "null" => Value::Null,
        _ => {
            // Infer from structure
            if schema.get("properties").is_some() {
                gen_object(schema, limits, rng, depth + 1)
            } else if schema.get("items").is_some() || schema.get("maxItems").is_some() {
                gen_array(schema, limits, rng, depth + 1)
            } else {
                Value::String(random_alnum(rng, 8))
            }
        }
    }
}

fn gen_string(schema: &Value, limits: &SamplerConfig, rng: &mut impl Rng) -> Value {
    let format = schema.get("format").and_then(Value::as_str);
    match format {
        Some("email") => Value::String(format!("user{}@example.com", rng.gen_range(1..9999_u32))),
        Some("uri" | "url") => Value::String("https://example.com".into()),
        Some("date") => Value::String("2024-01-15".into()),
        Some("date-time") => Value::String("2024-01-15T12:00:00Z".into()),
        Some("uuid") => Value::String(format!(
            "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
            rng.r#gen::<u32>(),
            rng.r#gen::<u16>(),
            rng.r#gen::<u16>() & 0x0FFF,
            (rng.r#gen::<u16>() & 0x3FFF) | 0x8000,
            rng.r#gen::<u64>() & 0xFFFF_FFFF_FFFF,
        )),
        _ => {
            let cap = limits.max_string_len as usize;
            let min = schema
                .get("minLength")
                .and_then(Value::as_u64)
                .map_or(1, |v| usize::try_from(v).unwrap_or(cap).min(cap));
            let max = schema
                .get("maxLength")
                .and_then(Value::as_u64)
                .map_or(cap, |v| usize::try_from(v).unwrap_or(cap).min(cap));
            let len = rng.gen_range(min..=max.max(min));
            Value::String(random_alnum(rng, len))
        }
    }
}

fn gen_integer(schema: &Value, rng: &mut impl Rng) -> Value {
    let exclusive = |key: &str| schema.get(key).and_then(Value::as_bool) == Some(true);
    let mut min = schema
        .get("minimum")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let mut max = schema
        .get("maximum")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| min.saturating_add(1000));
    if exclusive("exclusiveMinimum") {
        min = min.saturating_add(1);
    }
    if exclusive("exclusiveMaximum") {
        max = max.saturating_sub(1);
    }
    Value::Number(rng.gen_range(min..=max.max(min)).into())
}

fn gen_number(schema: &Value, rng: &mut impl Rng) -> Value {
    let min = schema
        .get("minimum")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let max = schema
        .get("maximum")
        .and_then(Value::as_f64)
        .unwrap_or(min + 1000.0)
        .max(min);
    let value = if (max - min).is_finite() {
        rng.gen_range(min..=max)
    } else {
        // span overflows f64: interpolate between the bounds instead
        let t: f64 = rng.r#gen();
        (min * (1.0 - t) + max * t).clamp(min, max)
    };
    json!(value)
}

fn gen_array(schema: &Value, limits: &SamplerConfig, rng: &mut impl Rng, depth: u32) -> Value {
    // Tuple: one value per positional schema
    if let Some(tuple) = schema.get("items").and_then(Value::as_array) {
        return Value::Array(
            tuple
                .iter()
                .map(|s| generate_inner(s, limits, rng, depth))
                .collect(),
        );
    }

    let as_len = |v: u64| usize::try_from(v).unwrap_or(usize::MAX);
    let min = schema
        .get("minItems")
        .and_then(Value::as_u64)
        .map_or(0, as_len);
    let max = schema
        .get("maxItems")
        .and_then(Value::as_u64)
        .map_or_else(|| min.max(limits.max_items as usize), as_len);
    let count = rng.gen_range(min..=max.max(min));
    let items_schema = schema
        .get("items")
        .cloned()
        .unwrap_or(json!({"type": "string"}));
    Value::Array(
        (0..count)
            .map(|_| generate_inner(&items_schema, limits, rng, depth))
            .collect(),
    )
}

fn gen_object(schema: &Value, limits: &SamplerConfig, rng: &mut impl Rng, depth: u32) -> Value {
    let mut obj = Map::new();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, prop_schema) in props {
            if required.contains(&key.as_str()) || rng.gen_bool(0.5) {
                obj.insert(key.clone(), generate_inner(prop_schema, limits, rng, depth));
            }
        }
    }
    Value::Object(obj)
}

fn random_alnum(rng: &mut impl Rng, len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}
