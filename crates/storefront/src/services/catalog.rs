//! Catalog reads: browsing, categories and title search.

use sqlx::PgPool;
use tracing::instrument;

use tradepost_core::ProductId;

use crate::db::{ProductRepository, RepositoryError};
use crate::models::Product;

/// Result of a title search.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// No search term was given.
    NoQuery,
    /// Products whose title contains the term. May be empty.
    Results { query: String, products: Vec<Product> },
}

/// A category and how many products it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub product_count: i64,
}

/// Read-only catalog access.
pub struct CatalogService<'a> {
    products: ProductRepository<'a>,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            products: ProductRepository::new(pool),
        }
    }

    /// All products ordered by title.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        self.products.list_all().await
    }

    /// Distinct categories for navigation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails.
    pub async fn categories(&self) -> Result<Vec<Category>, RepositoryError> {
        Ok(self
            .products
            .categories()
            .await?
            .into_iter()
            .map(|(name, product_count)| Category {
                name,
                product_count,
            })
            .collect())
    }

    /// Products grouped by category, categories in name order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails.
    pub async fn grouped_by_category(&self) -> Result<Vec<(String, Vec<Product>)>, RepositoryError> {
        Ok(group_by_category(self.products.list_all().await?))
    }

    /// Products in one category. Unknown categories yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_by_category(&self, name: &str) -> Result<Vec<Product>, RepositoryError> {
        self.products.list_by_category(name).await
    }

    /// One product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn get(&self, id: ProductId) -> Result<Product, RepositoryError> {
        self.products.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Case-insensitive title search.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails.
    #[instrument(skip(self))]
    pub async fn search(&self, query: Option<&str>) -> Result<SearchOutcome, RepositoryError> {
        let Some(term) = normalize_query(query) else {
            return Ok(SearchOutcome::NoQuery);
        };
        let products = self.products.search_title(term).await?;
        tracing::debug!(results = products.len(), "Title search");
        Ok(SearchOutcome::Results {
            query: term.to_owned(),
            products,
        })
    }
}

fn normalize_query(query: Option<&str>) -> Option<&str> {
    query.map(str::trim).filter(|q| !q.is_empty())
}

/// Group products by category, keeping each group in input order.
fn group_by_category(products: Vec<Product>) -> Vec<(String, Vec<Product>)> {
    let mut groups: std::collections::BTreeMap<String, Vec<Product>> =
        std::collections::BTreeMap::new();
    for product in products {
        groups
            .entry(product.category.clone())
            .or_default()
            .push(product);
    }
    groups.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tradepost_core::Money;

    use super::*;

    fn product(id: i32, title: &str, category: &str) -> Product {
        Product {
            id: ProductId::new(id),
            title: title.to_string(),
            price: Money::from_minor(100),
            description: String::new(),
            category: category.to_string(),
            image: String::new(),
            rating: None,
            stock: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_blank_query_is_no_query() {
        assert_eq!(normalize_query(None), None);
        assert_eq!(normalize_query(Some("   ")), None);
        assert_eq!(normalize_query(Some(" mug ")), Some("mug"));
    }

    #[test]
    fn test_group_by_category() {
        let groups = group_by_category(vec![
            product(1, "Apron", "kitchen"),
            product(2, "Beanie", "apparel"),
            product(3, "Cup", "kitchen"),
        ]);
        let names: Vec<&str> = groups.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["apparel", "kitchen"]);
        let kitchen: Vec<&str> = groups
            .last()
            .map(|(_, products)| products.iter().map(|p| p.title.as_str()).collect())
            .unwrap_or_default();
        assert_eq!(kitchen, ["Apron", "Cup"]);
    }
}
