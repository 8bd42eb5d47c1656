//! Checkout command.

use redseam_client::CheckoutDetails;

use super::{CliError, Context};
use crate::output;

pub async fn place_order(
    ctx: &Context,
    name: String,
    surname: String,
    email: Option<String>,
    address: String,
    zip: String,
) -> Result<(), CliError> {
    let session = ctx.session.current().ok_or(CliError::NotLoggedIn)?;
    let details = CheckoutDetails {
        name,
        surname,
        email: email.unwrap_or_else(|| session.user.email.clone()),
        address,
        zip,
    };
    // Fail on bad details before touching the network.
    details.validate()?;

    ctx.cart.refresh().await?;
    let order = ctx.cart.checkout(details).await?;

    if ctx.json {
        output::json(&order)?;
    } else {
        output::order(&order);
    }
    Ok(())
}
