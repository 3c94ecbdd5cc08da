use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRef {
    pub id: Uuid,
    pub name: String,
    pub hex: Option<String>,
}

/// Read-only catalog lookups (products, colors) injected into the engine.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    products: HashMap<Uuid, ProductRef>,
    colors: HashMap<String, ColorRef>,
}

impl ReferenceData {
    pub fn new(products: Vec<ProductRef>, colors: Vec<ColorRef>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            colors: colors.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    pub fn with_product(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.products.insert(
            id,
            ProductRef {
                id,
                name: name.into(),
            },
        );
        self
    }

    pub fn with_color(mut self, id: Uuid, name: impl Into<String>) -> Self {
        let name = name.into();
        self.colors.insert(
            name.clone(),
            ColorRef {
                id,
                name,
                hex: None,
            },
        );
        self
    }

    pub fn product(&self, id: Uuid) -> Option<&ProductRef> {
        self.products.get(&id)
    }

    pub fn product_name(&self, id: Uuid) -> Option<&str> {
        self.products.get(&id).map(|p| p.name.as_str())
    }

    /// Exact-name color lookup.
    pub fn color_by_name(&self, name: &str) -> Option<&ColorRef> {
        self.colors.get(name)
    }
}
