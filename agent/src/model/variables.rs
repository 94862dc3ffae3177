// File: agent/src/model/variables.rs
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::Variable;
use crate::constants::variables::MAX_SUBSTITUTION_PASSES;
use crate::errors::{UpdateError, UpdateResult};

/// Expands `${name}` references, repeating while values reference other
/// variables. Unknown references are left untouched.
pub fn substitute(value: &str, variables: &[Variable]) -> String {
    if variables.is_empty() || !value.contains("${") {
        return value.to_string();
    }

    let mut current = value.to_string();
    for _ in 0..MAX_SUBSTITUTION_PASSES {
        let mut next = current.clone();
        for variable in variables {
            next = next.replace(&format!("${{{}}}", variable.name), &variable.value);
        }
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn substitute_value(value: &mut Value, variables: &[Variable]) {
    match value {
        Value::String(s) => *s = substitute(s, variables),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| substitute_value(item, variables)),
        Value::Object(fields) => fields
            .values_mut()
            .for_each(|field| substitute_value(field, variables)),
        _ => {}
    }
}

/// Copy of a model element with every string field substituted.
pub fn resolve<T: Serialize + DeserializeOwned>(node: &T, variables: &[Variable]) -> UpdateResult<T> {
    let mut value = serde_json::to_value(node)
        .map_err(|e| UpdateError::Configuration(format!("cannot substitute variables: {}", e)))?;
    substitute_value(&mut value, variables);
    serde_json::from_value(value)
        .map_err(|e| UpdateError::Configuration(format!("cannot substitute variables: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn vars() -> Vec<Variable> {
        vec![
            Variable {
                name: "root".into(),
                value: "/opt/${product}".into(),
            },
            Variable {
                name: "product".into(),
                value: "shop".into(),
            },
        ]
    }

    #[test_case("${product}.war", "shop.war" ; "single reference")]
    #[test_case("${root}/deploy", "/opt/shop/deploy" ; "nested reference")]
    #[test_case("${missing}/x", "${missing}/x" ; "unknown reference kept")]
    #[test_case("plain", "plain" ; "no reference")]
    fn expands_references(input: &str, expected: &str) {
        assert_eq!(substitute(input, &vars()), expected);
    }

    #[test]
    fn resolves_nested_model_strings() {
        let location = crate::model::Location {
            name: "bin".into(),
            active: true,
            blocker: false,
            agent: String::new(),
            uri: "${root}/bin".into(),
            path: "/srv/${product}".into(),
            force: false,
        };
        let resolved = resolve(&location, &vars()).unwrap();
        assert_eq!(resolved.uri, "/opt/shop/bin");
        assert_eq!(resolved.path, "/srv/shop");
        assert!(resolved.active);
    }

    #[test]
    fn self_reference_terminates() {
        let looping = vec![Variable {
            name: "a".into(),
            value: "x${a}".into(),
        }];
        let expanded = substitute("${a}", &looping);
        assert!(expanded.starts_with("xxxx"));
    }
}
