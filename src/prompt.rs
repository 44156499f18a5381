//! Prompt template for product summaries.

use crate::catalog::ProductRecord;

/// Build the user prompt for a product. Field values are embedded verbatim.
pub fn product_prompt(product: &ProductRecord) -> String {
    format!(
        "Provide a detailed but concise description for the following product: \
         Product Name: {}. \
         Description: {}. \
         Features: {}. \
         Brand: {}. \
         Retail Price: {} USD. \
         Discounted Price: {} USD.",
        product.product_name,
        product.description,
        product.features,
        product.brand,
        product.price,
        product.discounted_price,
    )
}
