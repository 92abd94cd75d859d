//! EvaluationDetail: variante discriminada por `detail_type`.
//!
//! Invariante: sólo los campos del tag están poblados. `DetailInput` es la
//! forma plana que llega del cliente (seis columnas opcionales) y se valida
//! a `DetailVariant`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{clean_opt, FieldError};
use crate::EvaluationId;

string_tag! {
    pub enum DetailType : "detail_type" {
        Pgm => "pgm",
        Material => "material",
        Equipment => "equipment",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "detail_type", rename_all = "snake_case")]
pub enum DetailVariant {
    Pgm { pgm_version_before: String, pgm_version_after: String },
    Material { material_name: String, material_number: String },
    Equipment { equipment_name: String, equipment_number: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationDetail {
    pub id: i64,
    pub evaluation_id: EvaluationId,
    #[serde(flatten)]
    pub variant: DetailVariant,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailInput {
    pub detail_type: String,
    #[serde(default)]
    pub pgm_version_before: Option<String>,
    #[serde(default)]
    pub pgm_version_after: Option<String>,
    #[serde(default)]
    pub material_name: Option<String>,
    #[serde(default)]
    pub material_number: Option<String>,
    #[serde(default)]
    pub equipment_name: Option<String>,
    #[serde(default)]
    pub equipment_number: Option<String>,
}

/// Columnas planas tal como se persisten (tag + 6 opcionales).
pub type DetailColumns = (DetailType, [Option<String>; 6]);

impl DetailVariant {
    pub fn detail_type(&self) -> DetailType {
        match self {
            DetailVariant::Pgm { .. } => DetailType::Pgm,
            DetailVariant::Material { .. } => DetailType::Material,
            DetailVariant::Equipment { .. } => DetailType::Equipment,
        }
    }

    pub fn to_columns(&self) -> DetailColumns {
        match self {
            DetailVariant::Pgm { pgm_version_before, pgm_version_after } => (DetailType::Pgm,
                                                                             [Some(pgm_version_before.clone()),
                                                                              Some(pgm_version_after.clone()),
                                                                              None,
                                                                              None,
                                                                              None,
                                                                              None]),
            DetailVariant::Material { material_name, material_number } => {
                (DetailType::Material, [None, None, Some(material_name.clone()), Some(material_number.clone()), None, None])
            }
            DetailVariant::Equipment { equipment_name, equipment_number } => {
                (DetailType::Equipment, [None, None, None, None, Some(equipment_name.clone()), Some(equipment_number.clone())])
            }
        }
    }

    /// Reconstruye la variante desde columnas persistidas.
    pub fn from_columns(tag: &str, cols: [Option<String>; 6]) -> Result<Self, crate::DomainError> {
        let [before, after, mname, mnum, ename, enum_] = cols;
        DetailInput { detail_type: tag.to_string(),
                      pgm_version_before: before,
                      pgm_version_after: after,
                      material_name: mname,
                      material_number: mnum,
                      equipment_name: ename,
                      equipment_number: enum_ }.validate("detail")
                                                 .map_err(crate::DomainError::Validation)
    }
}

impl DetailInput {
    /// Valida el input contra su tag. `path` prefija los nombres de campo.
    pub fn validate(&self, path: &str) -> Result<DetailVariant, Vec<FieldError>> {
        let mut errors = Vec::new();
        let tag = match self.detail_type.trim().parse::<DetailType>() {
            Ok(t) => t,
            Err(_) => {
                errors.push(FieldError::new(format!("{path}.detail_type"),
                                            format!("invalid value '{}'", self.detail_type.trim())));
                return Err(errors);
            }
        };
        let fields: [(&str, Option<String>); 6] = [("pgm_version_before", clean_opt(self.pgm_version_before.clone())),
                                                   ("pgm_version_after", clean_opt(self.pgm_version_after.clone())),
                                                   ("material_name", clean_opt(self.material_name.clone())),
                                                   ("material_number", clean_opt(self.material_number.clone())),
                                                   ("equipment_name", clean_opt(self.equipment_name.clone())),
                                                   ("equipment_number", clean_opt(self.equipment_number.clone()))];
        let owned: [usize; 2] = match tag {
            DetailType::Pgm => [0, 1],
            DetailType::Material => [2, 3],
            DetailType::Equipment => [4, 5],
        };
        for (idx, (name, value)) in fields.iter().enumerate() {
            let is_owned = owned.contains(&idx);
            if is_owned && value.is_none() {
                errors.push(FieldError::new(format!("{path}.{name}"), format!("is required for {tag} details")));
            }
            if !is_owned && value.is_some() {
                errors.push(FieldError::new(format!("{path}.{name}"), format!("not allowed for {tag} details")));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        let take = |i: usize| fields[i].1.clone().unwrap_or_default();
        Ok(match tag {
               DetailType::Pgm => DetailVariant::Pgm { pgm_version_before: take(0), pgm_version_after: take(1) },
               DetailType::Material => DetailVariant::Material { material_name: take(2), material_number: take(3) },
               DetailType::Equipment => DetailVariant::Equipment { equipment_name: take(4), equipment_number: take(5) },
           })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pgm_requires_both_versions() {
        let input = DetailInput { detail_type: "pgm".into(),
                                  pgm_version_before: Some("1.0".into()),
                                  ..Default::default() };
        let errs = input.validate("details[0]").unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "details[0].pgm_version_after");
    }

    #[test]
    fn foreign_fields_are_rejected() {
        let input = DetailInput { detail_type: "material".into(),
                                  material_name: Some("Resin".into()),
                                  material_number: Some("R-7".into()),
                                  equipment_name: Some("Oven".into()),
                                  ..Default::default() };
        let errs = input.validate("d").unwrap_err();
        assert_eq!(errs[0].field, "d.equipment_name");
    }

    #[test]
    fn columns_round_trip() {
        let v = DetailVariant::Equipment { equipment_name: "Tester".into(), equipment_number: "EQ-9".into() };
        let (tag, cols) = v.to_columns();
        assert_eq!(DetailVariant::from_columns(tag.as_str(), cols).unwrap(), v);
    }
}
