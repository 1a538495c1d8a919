//! Seed the catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - title: Canvas Tote
//!     price: 2450        # minor units
//!     category: bags
//!     image: /static/images/tote.jpg
//!     description: Heavy cotton tote.
//!     rating: 4.6
//!     stock: 12
//! ```
//!
//! Products are matched by title: existing ones are updated in place, new
//! ones inserted. The whole file is validated before the database is touched.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use tradepost_storefront::db::ProductRepository;
use tradepost_storefront::db::products::{NewProduct, Upserted};

use super::{CommandError, connect};

/// Top-level shape of a seed file.
#[derive(Debug, Deserialize)]
struct SeedFile {
    products: Vec<NewProduct>,
}

/// Upsert every product in the file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any entry is
/// invalid, or a database write fails.
pub async fn products(path: &Path) -> Result<(), CommandError> {
    info!(path = %path.display(), "Loading products from file");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;

    let errors = validate(&seed.products);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::InvalidEntries(errors.len()));
    }
    info!(products = seed.products.len(), "Seed file validated");

    let pool = connect().await?;
    let repo = ProductRepository::new(&pool);

    let (mut inserted, mut updated) = (0_usize, 0_usize);
    for product in &seed.products {
        match repo.upsert(product).await? {
            Upserted::Inserted(id) => {
                inserted += 1;
                info!(%id, title = %product.title, "Inserted");
            }
            Upserted::Updated(id) => {
                updated += 1;
                info!(%id, title = %product.title, "Updated");
            }
        }
    }

    info!(inserted, updated, "Seeding complete");
    Ok(())
}

/// Check every entry, returning one message per problem.
fn validate(products: &[NewProduct]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, product) in products.iter().enumerate() {
        let title = product.title.trim();
        if title.is_empty() {
            errors.push(format!("entry {i}: title is empty"));
        } else if !seen.insert(title.to_lowercase()) {
            errors.push(format!("entry {i}: duplicate title '{title}'"));
        }
        if product.category.trim().is_empty() {
            errors.push(format!("entry {i}: category is empty"));
        }
        if product.price < 0 {
            errors.push(format!("entry {i}: price must not be negative"));
        }
        if product.stock < 0 {
            errors.push(format!("entry {i}: stock must not be negative"));
        }
    }

    errors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
products:
  - title: Canvas Tote
    price: 2450
    category: bags
    stock: 12
    rating: 4.6
  - title: Enamel Mug
    price: 1200
    category: kitchen
    image: /static/images/mug.jpg
";

    #[test]
    fn test_parse_sample() {
        let seed: SeedFile = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(seed.products.len(), 2);
        assert_eq!(seed.products[0].stock, 12);
        assert_eq!(seed.products[1].stock, 0);
        assert!(seed.products[1].rating.is_none());
        assert!(validate(&seed.products).is_empty());
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let yaml = r"
products:
  - title: Mug
    price: -1
    category: ''
  - title: mug
    price: 100
    category: kitchen
    stock: -3
";
        let seed: SeedFile = serde_yaml::from_str(yaml).unwrap();
        let errors = validate(&seed.products);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("duplicate title")));
    }

    #[test]
    fn test_missing_category_is_parse_error() {
        let yaml = "products:\n  - title: Mug\n    price: 100\n";
        assert!(serde_yaml::from_str::<SeedFile>(yaml).is_err());
    }
}
