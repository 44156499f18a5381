//! Product table loaded from a CSV file.
//!
//! The table is read once at startup and is read-only afterwards. Lookups are
//! a linear scan over the identifier column; the first matching row wins.

use std::collections::HashMap;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::config::ColumnConfig;
use crate::error::CatalogError;

/// The six fields of a product row that feed the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub product_name: String,
    pub description: String,
    pub features: String,
    pub brand: String,
    pub price: String,
    pub discounted_price: String,
}

/// In-memory product table keyed by the identifier column.
pub struct ProductCatalog {
    columns: HashMap<String, usize>,
    rows: Vec<StringRecord>,
    layout: ColumnConfig,
}

impl ProductCatalog {
    /// Load and validate the catalog at `path`.
    pub fn load(path: &Path, layout: &ColumnConfig) -> Result<Self, CatalogError> {
        let read_err = |source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(read_err)?;

        let headers = reader.headers().map_err(read_err)?.clone();
        if headers.is_empty() {
            return Err(CatalogError::EmptyHeader(path.to_path_buf()));
        }

        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;

        let catalog = Self::from_parts(&headers, rows, layout)?;
        info!(
            "Loaded {} products from {} ({} columns)",
            catalog.len(),
            path.display(),
            headers.len()
        );
        Ok(catalog)
    }

    fn from_parts(
        headers: &StringRecord,
        rows: Vec<StringRecord>,
        layout: &ColumnConfig,
    ) -> Result<Self, CatalogError> {
        // First occurrence wins for repeated header names
        let mut columns = HashMap::new();
        for (i, name) in headers.iter().enumerate() {
            columns.entry(name.to_string()).or_insert(i);
        }

        let id_index = *columns
            .get(&layout.id)
            .ok_or_else(|| CatalogError::MissingIdColumn(layout.id.clone()))?;

        for name in [
            &layout.product_name,
            &layout.description,
            &layout.features,
            &layout.brand,
            &layout.price,
            &layout.discounted_price,
        ] {
            if !columns.contains_key(name) {
                warn!("Catalog has no '{name}' column, it will render empty");
            }
        }

        // Blank ids can never be looked up, so they don't count as duplicates
        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
        let mut blank = 0;
        for (i, row) in rows.iter().enumerate() {
            let id = row.get(id_index).unwrap_or("");
            if id.is_empty() {
                blank += 1;
                continue;
            }
            if let Some(first) = seen.insert(id, i + 1) {
                return Err(CatalogError::DuplicateId {
                    id: id.to_string(),
                    first,
                    second: i + 1,
                });
            }
        }
        if blank > 0 {
            warn!("{blank} catalog rows have an empty '{}' and cannot be looked up", layout.id);
        }

        Ok(Self {
            columns,
            rows,
            layout: layout.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate the values of a column by header name. Short rows yield "".
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let index = *self.columns.get(name)?;
        Some(self.rows.iter().map(move |row| row.get(index).unwrap_or("")))
    }

    /// Find the product whose identifier equals `id` exactly.
    pub fn lookup(&self, id: &str) -> Option<ProductRecord> {
        if id.is_empty() {
            return None;
        }
        let position = self
            .column(&self.layout.id)?
            .position(|value| value == id)?;
        let row = &self.rows[position];
        debug!("Matched product id {id} at row {}", position + 1);

        let field = |name: &str| -> String {
            self.columns
                .get(name)
                .and_then(|&i| row.get(i))
                .unwrap_or("")
                .to_string()
        };

        Some(ProductRecord {
            product_name: field(&self.layout.product_name),
            description: field(&self.layout.description),
            features: field(&self.layout.features),
            brand: field(&self.layout.brand),
            price: field(&self.layout.price),
            discounted_price: field(&self.layout.discounted_price),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const HEADER: &str =
        "uniq_id,product_name,description,product_specifications,brand,retail_price,discounted_price";

    pub(crate) fn write_csv(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{body}").unwrap();
        file
    }

    pub(crate) fn widget_catalog() -> ProductCatalog {
        let file = write_csv(&format!(
            "{HEADER}\nP1,Widget,A small widget,[],Acme,9.99,7.99\n"
        ));
        ProductCatalog::load(file.path(), &ColumnConfig::default()).unwrap()
    }

    #[test]
    fn lookup_projects_all_six_fields() {
        let file = write_csv(&format!(
            "{HEADER}\n\
             P1,Widget,A small widget,[],Acme,9.99,7.99\n\
             P2,\"Gadget, Deluxe\",\"Multi\nline\",\"{{\"\"k\"\":\"\"v\"\"}}\",Initech,120,99\n"
        ));
        let catalog = ProductCatalog::load(file.path(), &ColumnConfig::default()).unwrap();
        assert_eq!(catalog.len(), 2);

        let p1 = catalog.lookup("P1").unwrap();
        assert_eq!(
            p1,
            ProductRecord {
                product_name: "Widget".into(),
                description: "A small widget".into(),
                features: "[]".into(),
                brand: "Acme".into(),
                price: "9.99".into(),
                discounted_price: "7.99".into(),
            }
        );

        let p2 = catalog.lookup("P2").unwrap();
        assert_eq!(p2.product_name, "Gadget, Deluxe");
        assert_eq!(p2.description, "Multi\nline");
        assert_eq!(p2.features, "{\"k\":\"v\"}");
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let catalog = widget_catalog();
        assert!(catalog.lookup("p1").is_none());
        assert!(catalog.lookup(" P1").is_none());
        assert!(catalog.lookup("P").is_none());
        assert!(catalog.lookup("").is_none());
    }

    #[test]
    fn missing_optional_columns_render_empty() {
        let file = write_csv("uniq_id,product_name\nX9,Lamp\nX10\n");
        let catalog = ProductCatalog::load(file.path(), &ColumnConfig::default()).unwrap();

        let lamp = catalog.lookup("X9").unwrap();
        assert_eq!(lamp.product_name, "Lamp");
        assert_eq!(lamp.brand, "");
        assert_eq!(lamp.discounted_price, "");

        // Ragged row shorter than the header
        assert_eq!(catalog.lookup("X10").unwrap().product_name, "");
    }

    #[test]
    fn missing_id_column_is_rejected() {
        let file = write_csv("sku,product_name\nA,Lamp\n");
        match ProductCatalog::load(file.path(), &ColumnConfig::default()) {
            Err(CatalogError::MissingIdColumn(col)) => assert_eq!(col, "uniq_id"),
            other => panic!("expected MissingIdColumn, got {:?}", other.err()),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected_at_load() {
        let file = write_csv(&format!(
            "{HEADER}\nP1,A,,,,1,1\nP2,B,,,,2,2\nP1,C,,,,3,3\n"
        ));
        match ProductCatalog::load(file.path(), &ColumnConfig::default()) {
            Err(CatalogError::DuplicateId { id, first, second }) => {
                assert_eq!(id, "P1");
                assert_eq!((first, second), (1, 3));
            }
            other => panic!("expected DuplicateId, got {:?}", other.err()),
        }
    }

    #[test]
    fn blank_ids_are_not_duplicates() {
        let file = write_csv(&format!(
            "{HEADER}\n,A,,,,1,1\nP1,Widget,,,,1,1\n,B,,,,2,2\n"
        ));
        let catalog = ProductCatalog::load(file.path(), &ColumnConfig::default()).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.lookup("P1").unwrap().product_name, "Widget");
        assert!(catalog.lookup("").is_none());
    }

    #[test]
    fn empty_file_has_no_header() {
        let file = write_csv("");
        assert!(matches!(
            ProductCatalog::load(file.path(), &ColumnConfig::default()),
            Err(CatalogError::EmptyHeader(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = ProductCatalog::load(
            Path::new("/nonexistent/products.csv"),
            &ColumnConfig::default(),
        );
        assert!(matches!(result, Err(CatalogError::Read { .. })));
    }

    #[test]
    fn custom_column_layout_and_column_access() {
        let file = write_csv("sku,title,price\nA1,Chair,10\nB2,Desk,55\n");
        let layout = ColumnConfig {
            id: "sku".into(),
            product_name: "title".into(),
            ..ColumnConfig::default()
        };
        let catalog = ProductCatalog::load(file.path(), &layout).unwrap();

        let ids: Vec<&str> = catalog.column("sku").unwrap().collect();
        assert_eq!(ids, ["A1", "B2"]);
        assert!(catalog.column("nope").is_none());

        let desk = catalog.lookup("B2").unwrap();
        assert_eq!(desk.product_name, "Desk");
        // "price" is not the configured price column ("retail_price")
        assert_eq!(desk.price, "");
    }
}
