//! Reference data the operator form and pricing depend on.
//!
//! The reconciler reads the field configuration to decide what is required
//! and the materials list to price completed tickets. Both are owned by the
//! store; this module only holds a snapshot and the factory defaults.

use serde::{Deserialize, Serialize};

use crate::model::{Destination, FieldConfig, FieldKind, Material};

/// Names of the built-in form fields.
pub mod field {
    pub const VEHICLE_REG: &str = "vehicleReg";
    pub const MATERIAL: &str = "material";
    pub const DESTINATION: &str = "destination";
    pub const FIRST_WEIGHT: &str = "weight1";
    pub const SECOND_WEIGHT: &str = "weight2";

    pub const BUILT_IN: &[&str] = &[VEHICLE_REG, MATERIAL, DESTINATION, FIRST_WEIGHT, SECOND_WEIGHT];
}

/// Snapshot of the configured fields, materials and destinations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub fields: Vec<FieldConfig>,
    pub materials: Vec<Material>,
    pub destinations: Vec<Destination>,
}

impl Catalog {
    /// Factory defaults, also seeded into a fresh store.
    pub fn defaults() -> Self {
        Self {
            fields: default_field_configs(),
            materials: default_materials(),
            destinations: default_destinations(),
        }
    }

    /// Fields sorted by display order.
    pub fn sorted_fields(&self) -> Vec<&FieldConfig> {
        let mut fields: Vec<&FieldConfig> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.order);
        fields
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Price per unit for `name`, 0 when the material is unknown.
    pub fn price_for(&self, name: &str) -> f64 {
        self.material(name).map(|m| m.price_per_unit).unwrap_or(0.0)
    }

    /// Label shown to the operator for `name`, falling back to the name.
    pub fn label_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.label.as_str())
            .unwrap_or(name)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn field_config(
    name: &str,
    label: &str,
    kind: FieldKind,
    required: bool,
    options: &[&str],
    order: i64,
) -> FieldConfig {
    FieldConfig {
        id: name.to_string(),
        name: name.to_string(),
        label: label.to_string(),
        kind,
        required,
        options: options.iter().map(|o| o.to_string()).collect(),
        order,
    }
}

pub fn default_field_configs() -> Vec<FieldConfig> {
    vec![
        field_config(field::VEHICLE_REG, "Vehicle Registration", FieldKind::Text, true, &[], 1),
        field_config(
            field::MATERIAL,
            "Material",
            FieldKind::Select,
            true,
            &["Steel", "Iron", "Aluminum", "Copper", "Scrap Metal"],
            2,
        ),
        field_config(field::DESTINATION, "Destination", FieldKind::Select, true, &[], 3),
        field_config(field::FIRST_WEIGHT, "Weight 1 (kg)", FieldKind::Number, true, &[], 4),
        field_config(field::SECOND_WEIGHT, "Weight 2 (kg)", FieldKind::Number, false, &[], 5),
    ]
}

pub fn default_materials() -> Vec<Material> {
    [
        ("1", "Steel", 0.50),
        ("2", "Iron", 0.45),
        ("3", "Aluminum", 1.20),
        ("4", "Copper", 6.50),
        ("5", "Scrap Metal", 0.30),
    ]
    .into_iter()
    .map(|(id, name, price)| Material {
        id: id.to_string(),
        name: name.to_string(),
        unit: "kg".to_string(),
        price_per_unit: price,
    })
    .collect()
}

pub fn default_destinations() -> Vec<Destination> {
    [
        ("1", "Warehouse A"),
        ("2", "Warehouse B"),
        ("3", "Processing Plant"),
        ("4", "Export Terminal"),
        ("5", "Local Distributor"),
    ]
    .into_iter()
    .map(|(id, name)| Destination {
        id: id.to_string(),
        name: name.to_string(),
    })
    .collect()
}
