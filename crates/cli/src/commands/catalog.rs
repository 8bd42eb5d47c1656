//! Product browsing.

use redseam_client::api::{ProductQuery, ProductSort};
use redseam_core::ProductId;

use super::{CliError, Context};
use crate::output;

pub async fn products(
    ctx: &Context,
    page: u32,
    price_from: Option<u32>,
    price_to: Option<u32>,
    sort: ProductSort,
) -> Result<(), CliError> {
    let query = ProductQuery {
        page,
        price_from,
        price_to,
        sort,
    };
    let page = ctx.api.list_products(&query).await?;

    if ctx.json {
        output::json(&page)?;
    } else {
        output::product_page(&page);
    }
    Ok(())
}

pub async fn product(ctx: &Context, id: i64) -> Result<(), CliError> {
    let product = ctx.api.get_product(ProductId::new(id)).await?;

    if ctx.json {
        output::json(&product)?;
    } else {
        output::product(&product);
    }
    Ok(())
}
