use crate::error::{CoreError, Result};
use crate::types::ProductKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub kind: ProductKind,
    pub price_cents: u32,
    /// Whether a qualifying purchase of this product issues a gift code.
    #[serde(default)]
    pub giftable: bool,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable product catalog, built once at startup and shared by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    products: BTreeMap<String, Product>,
}

impl Catalog {
    /// The shipped product line-up.
    pub fn builtin() -> Self {
        let products = [
            Product {
                id: "custom-lesson-video".to_string(),
                title: "Personalized Video Lesson".to_string(),
                kind: ProductKind::AudioVideo,
                price_cents: 4900,
                giftable: true,
            },
            Product {
                id: "custom-lesson-audio".to_string(),
                title: "Personalized Audio Lesson".to_string(),
                kind: ProductKind::AudioOnly,
                price_cents: 2900,
                giftable: true,
            },
            Product {
                id: "bedtime-message-audio".to_string(),
                title: "Personalized Bedtime Message".to_string(),
                kind: ProductKind::AudioOnly,
                price_cents: 1900,
                giftable: false,
            },
        ];
        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Load the catalog from a YAML file (a list of products), falling back
    /// to the built-in line-up when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::builtin());
        }
        let data = std::fs::read_to_string(path)?;
        let products: Vec<Product> = serde_yaml::from_str(&data)?;
        Ok(Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        })
    }

    pub fn get(&self, product_id: &str) -> Result<&Product> {
        self.products
            .get(product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_catalog_has_audio_and_video_products() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.get("custom-lesson-video").unwrap().kind,
            ProductKind::AudioVideo
        );
        assert_eq!(
            catalog.get("custom-lesson-audio").unwrap().kind,
            ProductKind::AudioOnly
        );
    }

    #[test]
    fn unknown_product_is_an_error() {
        let catalog = Catalog::builtin();
        assert!(matches!(
            catalog.get("no-such-product"),
            Err(CoreError::ProductNotFound(_))
        ));
    }

    #[test]
    fn load_from_yaml_overrides_builtin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(
            &path,
            "- id: solo\n  title: Solo Lesson\n  kind: audio_only\n  price_cents: 100\n",
        )
        .unwrap();
        let catalog = Catalog::load(&path).unwrap();
        assert!(catalog.get("solo").is_ok());
        assert!(catalog.get("custom-lesson-video").is_err());
    }

    #[test]
    fn load_missing_file_falls_back_to_builtin() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::load(&dir.path().join("absent.yaml")).unwrap();
        assert!(catalog.get("custom-lesson-video").is_ok());
    }
}
