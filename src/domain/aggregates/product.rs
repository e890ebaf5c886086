//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::image::{is_absolute_url, resolve_cell};
use crate::catalog::{CatalogItem, ImageIndex, ImageRef, IntoCatalogItem};
use crate::domain::value_objects::{ItemKey, Origin};

/// A product row in the database.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub active: bool,
    /// Uploaded file path, relative to the image directory.
    pub image_file: Option<String>,
    /// Hosted copy of the image, preferred when present.
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_available(&self) -> bool { self.active && self.stock > 0 }

    pub fn has_stock(&self, quantity: u32) -> bool {
        i64::from(self.stock) >= i64::from(quantity)
    }

    pub fn image(&self, images: &ImageIndex) -> ImageRef {
        if let Some(url) = self.image_url.as_deref().filter(|u| is_absolute_url(u)) {
            return ImageRef::Remote(url.trim().to_string());
        }
        match self.image_file.as_deref() {
            Some(file) => {
                let (local, remote) = resolve_cell(file, images);
                ImageRef::from_parts(local, remote)
            }
            None => ImageRef::None,
        }
    }
}

impl IntoCatalogItem for Product {
    fn to_catalog_item(&self, images: &ImageIndex) -> CatalogItem {
        CatalogItem {
            origin: Origin::Database,
            key: ItemKey::database(self.id),
            brand: self.brand.clone(),
            title: self.name.clone(),
            description: self.description.clone(),
            duration: None,
            price: Some(self.price),
            stock: u32::try_from(self.stock).unwrap_or(0),
            active: self.active,
            image: self.image(images),
            linked_product_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product {
            id: 3,
            name: "Sahumerio Lavanda".into(),
            brand: "Hem".into(),
            description: "Aroma relajante".into(),
            price: Decimal::new(500, 0),
            stock: 10,
            active: true,
            image_file: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_availability() {
        let mut p = product();
        assert!(p.is_available());
        assert!(p.has_stock(10));
        assert!(!p.has_stock(11));
        p.stock = 0;
        assert!(!p.is_available());
        p.stock = 5;
        p.active = false;
        assert!(!p.is_available());
    }

    #[test]
    fn test_image_prefers_hosted_url() {
        let images = ImageIndex::from_files(["lavanda.png"]);
        let mut p = product();
        assert_eq!(p.image(&images), ImageRef::None);
        p.image_file = Some("productos/lavanda.png".into());
        assert_eq!(p.image(&images), ImageRef::Local("lavanda.png".into()));
        p.image_url = Some("https://res.cloudinary.com/demo/lavanda.png".into());
        assert_eq!(p.image(&images), ImageRef::Remote("https://res.cloudinary.com/demo/lavanda.png".into()));
        p.image_url = Some("not a url".into());
        assert_eq!(p.image(&images), ImageRef::Local("lavanda.png".into()));
    }

    #[test]
    fn test_catalog_item_adapter() {
        let mut p = product();
        p.stock = -2;
        let item = p.to_catalog_item(&ImageIndex::default());
        assert_eq!(item.origin, Origin::Database);
        assert_eq!(item.key.to_string(), "DB:3");
        assert_eq!(item.title, "Sahumerio Lavanda");
        assert_eq!(item.price, Some(Decimal::new(500, 0)));
        assert_eq!(item.stock, 0);
    }
}
