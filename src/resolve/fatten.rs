//! Fattening: binding every parameter of a component to a concrete value.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::resolve::types::ResolvedType;

/// Resolved value of one parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    /// SI magnitude.
    Number(f64),
    /// Text, path or link parameters.
    Text(String),
    /// Id of a fattened component.
    Component(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundParameter {
    pub literal: String,
    pub value: ParamValue,
}

/// A component with its type resolved and every value bound.
#[derive(Clone, Debug)]
pub struct FatComponent {
    pub id: String,
    pub component_type: Arc<ResolvedType>,
    pub parameters: IndexMap<String, BoundParameter>,
    pub derived_parameters: IndexMap<String, f64>,
    pub constants: IndexMap<String, f64>,
    pub children: Vec<Arc<FatComponent>>,
}

impl FatComponent {
    pub fn type_name(&self) -> &str {
        &self.component_type.name
    }

    /// Numeric value of a parameter, derived parameter or constant.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.parameters.get(name).map(|p| &p.value) {
            Some(ParamValue::Number(value)) => Some(*value),
            Some(_) => None,
            None => self
                .derived_parameters
                .get(name)
                .or_else(|| self.constants.get(name))
                .copied(),
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.parameters.get(name).map(|p| &p.value) {
            Some(ParamValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn component_ref(&self, name: &str) -> Option<&str> {
        match self.parameters.get(name).map(|p| &p.value) {
            Some(ParamValue::Component(id)) => Some(id),
            _ => None,
        }
    }

    /// Every numeric value in declaration order: parameters, derived
    /// parameters, then constants.
    pub fn numbers(&self) -> impl Iterator<Item = (&str, f64)> {
        self.parameters
            .iter()
            .filter_map(|(name, p)| match p.value {
                ParamValue::Number(v) => Some((name.as_str(), v)),
                _ => None,
            })
            .chain(self.derived_parameters.iter().map(|(n, v)| (n.as_str(), *v)))
            .chain(self.constants.iter().map(|(n, v)| (n.as_str(), *v)))
    }

    /// Every text-like value: text, path and link parameters and component
    /// references.
    pub fn texts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().filter_map(|(name, p)| match &p.value {
            ParamValue::Text(text) | ParamValue::Component(text) => {
                Some((name.as_str(), text.as_str()))
            }
            ParamValue::Number(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_by_kind() {
        let mut parameters = IndexMap::new();
        parameters.insert(
            "tau".to_string(),
            BoundParameter {
                literal: "10ms".into(),
                value: ParamValue::Number(0.01),
            },
        );
        parameters.insert(
            "label".to_string(),
            BoundParameter {
                literal: "soma".into(),
                value: ParamValue::Text("soma".into()),
            },
        );
        parameters.insert(
            "cell".to_string(),
            BoundParameter {
                literal: "c0".into(),
                value: ParamValue::Component("c0".into()),
            },
        );
        let mut derived = IndexMap::new();
        derived.insert("rate".to_string(), 100.0);

        let fat = FatComponent {
            id: "x".into(),
            component_type: Arc::new(ResolvedType::default()),
            parameters,
            derived_parameters: derived,
            constants: IndexMap::new(),
            children: vec![],
        };

        assert_eq!(fat.number("tau"), Some(0.01));
        assert_eq!(fat.number("rate"), Some(100.0));
        assert_eq!(fat.number("label"), None);
        assert_eq!(fat.text("label"), Some("soma"));
        assert_eq!(fat.component_ref("cell"), Some("c0"));
        assert_eq!(fat.numbers().count(), 2);
        assert_eq!(fat.texts().count(), 2);
    }
}
