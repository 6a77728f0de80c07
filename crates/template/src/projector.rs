//! Flattening of declarative templates and value extraction.

use adu_core::{SimpleField, SubmissionData, TemplateField, GROUP_COUNTER_PLACEHOLDER};
use serde_json::{Map, Value};

/// A template flattened into positionally aligned field names and data keys.
///
/// Order follows template declaration order, with every grouping block
/// expanded in place for counters `1..=count`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldLayout {
    pub field_names: Vec<String>,
    pub data_keys: Vec<String>,
}

impl FieldLayout {
    pub fn from_template(template: &[TemplateField]) -> Self {
        let mut layout = Self::default();
        for field in template {
            match field {
                TemplateField::Simple(simple) => layout.push(simple, None),
                TemplateField::Grouping(group) => {
                    for i in 1..=group.count {
                        for inner in &group.template {
                            layout.push(inner, Some(i));
                        }
                    }
                }
            }
        }
        layout
    }

    fn push(&mut self, field: &SimpleField, counter: Option<u32>) {
        match counter {
            Some(i) => {
                let n = i.to_string();
                self.field_names
                    .push(field.display_name.replace(GROUP_COUNTER_PLACEHOLDER, &n));
                self.data_keys
                    .push(field.data_key.replace(GROUP_COUNTER_PLACEHOLDER, &n));
            }
            None => {
                self.field_names.push(field.display_name.clone());
                self.data_keys.push(field.data_key.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.field_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_names.is_empty()
    }

    /// Values for each data key; absent keys and JSON nulls become `None`.
    pub fn extract(&self, data: &SubmissionData) -> Vec<Option<Value>> {
        self.data_keys
            .iter()
            .map(|key| match data.get(key) {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.clone()),
            })
            .collect()
    }

    /// Outbound request body: field name → value, `null` where the key is absent.
    pub fn payload(&self, data: &SubmissionData) -> Map<String, Value> {
        self.field_names
            .iter()
            .zip(self.extract(data))
            .map(|(name, value)| (name.clone(), value.unwrap_or(Value::Null)))
            .collect()
    }
}

/// Field names and the matching values for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub field_names: Vec<String>,
    pub values: Vec<Option<Value>>,
}

/// Flatten `template` and pull the corresponding values out of `data`.
pub fn project(template: &[TemplateField], data: &SubmissionData) -> Projection {
    let layout = FieldLayout::from_template(template);
    let values = layout.extract(data);
    Projection {
        field_names: layout.field_names,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> SubmissionData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn grouping_expands_in_order() {
        let template = vec![TemplateField::grouping(
            3,
            vec![SimpleField::new("ADU %#% type", "t_%#%")],
        )];
        let layout = FieldLayout::from_template(&template);
        assert_eq!(layout.field_names, vec!["ADU 1 type", "ADU 2 type", "ADU 3 type"]);
        assert_eq!(layout.data_keys, vec!["t_1", "t_2", "t_3"]);
    }

    #[test]
    fn grouping_repeats_whole_inner_block_per_counter() {
        let template = vec![
            TemplateField::simple("Num ADUs", "current_num_adu"),
            TemplateField::grouping(
                2,
                vec![
                    SimpleField::new("ADU %#% type", "type_%#%"),
                    SimpleField::new("ADU %#% sqft", "sqft_%#%"),
                ],
            ),
            TemplateField::simple("Trailer", "trailer"),
        ];
        let layout = FieldLayout::from_template(&template);
        assert_eq!(
            layout.data_keys,
            vec!["current_num_adu", "type_1", "sqft_1", "type_2", "sqft_2", "trailer"]
        );
        assert_eq!(layout.len(), layout.data_keys.len());
    }

    #[test]
    fn missing_keys_project_to_none() {
        let template = vec![
            TemplateField::simple("Block", "block"),
            TemplateField::simple("Lot", "lot"),
            TemplateField::simple("Nullish", "nullish"),
        ];
        let projection = project(&template, &data(json!({"block": "1", "nullish": null})));
        assert_eq!(projection.field_names, vec!["Block", "Lot", "Nullish"]);
        assert_eq!(projection.values, vec![Some(json!("1")), None, None]);
    }

    #[test]
    fn projection_is_deterministic() {
        let template = vec![
            TemplateField::simple("A", "a"),
            TemplateField::grouping(4, vec![SimpleField::new("B%#%", "b%#%")]),
        ];
        let d = data(json!({"a": 1, "b2": true, "b4": "x"}));
        let first = project(&template, &d);
        let second = project(&template, &d);
        assert_eq!(first, second);
        assert_eq!(first.field_names.len(), first.values.len());
    }

    #[test]
    fn payload_keys_use_display_names() {
        let template = vec![
            TemplateField::simple("job_size", "est_cost"),
            TemplateField::simple("contractor", "name_of_organization"),
        ];
        let layout = FieldLayout::from_template(&template);
        let payload = layout.payload(&data(json!({"est_cost": 12000})));
        assert_eq!(payload["job_size"], json!(12000));
        assert_eq!(payload["contractor"], Value::Null);
    }

    #[test]
    fn empty_template_projects_nothing() {
        let projection = project(&[], &data(json!({"a": 1})));
        assert!(projection.field_names.is_empty());
        assert!(projection.values.is_empty());
    }
}
