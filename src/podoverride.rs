//! Strategic-merge overrides for the generated pod spec.
//!
//! The user override document merges onto the built pod spec the way
//! Kubernetes strategic merge does: mappings merge key by key, lists of
//! named elements merge element-wise by their merge key, everything else is
//! replaced wholesale. The override applies to the pod spec only. `metadata`
//! and `initContainers` are rejected outright so the operator labels, the
//! owner reference, and the session-data sidecar survive any override.

use k8s_openapi::api::core::v1::PodSpec;
use serde_json::{Map, Value};

use crate::crd::PodOverride;
use crate::error::{OperatorError, OperatorResult};

/// Override fields that would break operator invariants.
const FORBIDDEN_FIELDS: &[&str] = &["metadata", "initContainers"];

/// Strategic merge key per pod-spec list field. Lists without one are
/// replaced wholesale.
fn merge_key(field: &str) -> Option<&'static str> {
    match field {
        "containers" | "volumes" | "imagePullSecrets" | "env" => Some("name"),
        "volumeMounts" => Some("mountPath"),
        "ports" => Some("containerPort"),
        "hostAliases" => Some("ip"),
        _ => None,
    }
}

/// Check an override document without applying it. Also run during session
/// validation so an illegal override is a terminal validation failure
/// instead of a retry loop at pod creation.
pub fn validate_override(overrides: &PodOverride) -> OperatorResult<()> {
    for field in FORBIDDEN_FIELDS {
        if overrides.contains_key(*field) {
            return Err(OperatorError::Validation(format!(
                "pod override may not modify {field}"
            )));
        }
    }
    if contains_patch_directive(overrides) {
        return Err(OperatorError::Validation(
            "$patch directives are not supported in pod override".to_string(),
        ));
    }
    Ok(())
}

/// Apply the user override document to a built pod spec.
pub fn override_pod_spec(pod_spec: PodSpec, overrides: &PodOverride) -> OperatorResult<PodSpec> {
    if overrides.is_empty() {
        return Ok(pod_spec);
    }
    validate_override(overrides)?;

    let mut merged = serde_json::to_value(&pod_spec)?;
    merge_objects(&mut merged, overrides);
    Ok(serde_json::from_value(merged)?)
}

fn merge_objects(target: &mut Value, overrides: &Map<String, Value>) {
    let Value::Object(fields) = target else {
        return;
    };
    for (key, value) in overrides {
        match fields.get_mut(key) {
            Some(slot) => merge_field(slot, value, key),
            None => {
                fields.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_field(original: &mut Value, overriding: &Value, field: &str) {
    match overriding {
        Value::Object(fields) if original.is_object() => merge_objects(original, fields),
        Value::Array(items) => {
            if let (Some(key), Value::Array(existing)) = (merge_key(field), &mut *original) {
                merge_keyed_list(existing, items, key);
            } else {
                *original = overriding.clone();
            }
        }
        _ => *original = overriding.clone(),
    }
}

/// Merge a keyed list: override elements matching an existing element by
/// the merge key merge into it field by field, unmatched elements append.
/// Existing order is preserved.
fn merge_keyed_list(existing: &mut Vec<Value>, overrides: &[Value], key: &str) {
    for item in overrides {
        let Value::Object(fields) = item else {
            existing.push(item.clone());
            continue;
        };
        let matched = fields
            .get(key)
            .and_then(|id| existing.iter_mut().find(|element| element.get(key) == Some(id)));
        match matched {
            Some(slot) => merge_objects(slot, fields),
            None => existing.push(item.clone()),
        }
    }
}

fn contains_patch_directive(fields: &Map<String, Value>) -> bool {
    fields.iter().any(|(key, value)| {
        key.starts_with('$')
            || match value {
                Value::Object(inner) => contains_patch_directive(inner),
                Value::Array(items) => items
                    .iter()
                    .any(|item| matches!(item, Value::Object(inner) if contains_patch_directive(inner))),
                _ => false,
            }
    })
}
