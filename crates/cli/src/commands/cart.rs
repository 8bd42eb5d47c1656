//! Cart commands.

use redseam_client::CartPhase;
use redseam_client::api::Product;
use redseam_core::{CartLine, CartSnapshot, LineKey, ProductId};

use super::{CliError, Context};
use crate::output;

pub async fn show(ctx: &Context) -> Result<(), CliError> {
    ctx.require_login()?;
    let snapshot = ctx.cart.refresh().await?;
    print(ctx, &snapshot)
}

pub async fn add(
    ctx: &Context,
    id: i64,
    color: Option<String>,
    size: Option<String>,
    quantity: u32,
) -> Result<(), CliError> {
    ctx.require_login()?;
    let product = ctx.api.get_product(ProductId::new(id)).await?;
    let color = pick_option("color", color, &product.available_colors)?;
    let size = pick_option("size", size, &product.available_sizes)?;

    // Incrementing needs the current quantity of the line.
    ctx.cart.refresh().await?;

    let item = CartLine {
        image: color
            .as_deref()
            .and_then(|c| product.image_for_color(c))
            .or(product.cover_image.as_deref())
            .map(str::to_string),
        key: LineKey::with_options(product.id, color, size),
        name: product.name.clone(),
        unit_price: product.price,
        quantity,
    };
    let snapshot = ctx.cart.add_item(item).await?;

    tracing::info!(product = %describe(&product), quantity, "Added to cart");
    print(ctx, &snapshot)
}

pub async fn update(
    ctx: &Context,
    id: i64,
    color: Option<String>,
    size: Option<String>,
    quantity: i64,
) -> Result<(), CliError> {
    ctx.require_login()?;
    let current = ctx.cart.refresh().await?;
    let key = resolve_line(&current, id, color.as_deref(), size.as_deref())?;

    let snapshot = ctx.cart.update_quantity(&key, quantity).await?;
    print(ctx, &snapshot)
}

pub async fn remove(
    ctx: &Context,
    id: i64,
    color: Option<String>,
    size: Option<String>,
) -> Result<(), CliError> {
    ctx.require_login()?;
    let current = ctx.cart.refresh().await?;
    let key = resolve_line(&current, id, color.as_deref(), size.as_deref())?;

    let snapshot = ctx.cart.remove_item(&key).await?;
    print(ctx, &snapshot)
}

pub async fn clear(ctx: &Context) -> Result<(), CliError> {
    ctx.require_login()?;
    ctx.cart.refresh().await?;
    let snapshot = ctx.cart.remove_all().await?;
    print(ctx, &snapshot)
}

/// Follow the session file and print the cart on every change until Ctrl-C.
pub async fn watch(ctx: &Context) -> Result<(), CliError> {
    let _store_watcher = ctx.session.spawn_store_watcher(ctx.config.session_poll_interval);
    let _listener = ctx.cart.spawn_session_listener();
    let mut state = ctx.cart.subscribe();

    if let Err(e) = ctx.cart.refresh().await {
        tracing::warn!(error = %e, "Initial cart refresh failed");
    }

    tracing::info!(
        fallback_poll_interval = ?ctx.config.session_poll_interval,
        "Watching cart, press Ctrl-C to stop"
    );

    loop {
        let current = state.borrow_and_update().clone();
        match current.phase {
            CartPhase::Unauthenticated => output::line("-- logged out --"),
            CartPhase::Loading => {}
            CartPhase::Ready => {
                if let Some(err) = &current.last_error {
                    output::line(format_args!("-- last operation failed: {err} --"));
                }
                print(ctx, &current.snapshot)?;
            }
        }

        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print(ctx: &Context, snapshot: &CartSnapshot) -> Result<(), CliError> {
    if ctx.json {
        output::json(snapshot)?;
    } else {
        output::cart(snapshot);
    }
    Ok(())
}

fn describe(product: &Product) -> String {
    format!("{} (#{})", product.name, product.id)
}

/// Validate a variant option, defaulting to the first one offered.
fn pick_option(
    name: &str,
    requested: Option<String>,
    available: &[String],
) -> Result<Option<String>, CliError> {
    match requested {
        Some(value) if available.is_empty() || available.contains(&value) => Ok(Some(value)),
        Some(value) => Err(CliError::InvalidArgument(format!(
            "{name} {value:?} is not available (choose from {})",
            available.join(", ")
        ))),
        None => Ok(available.first().cloned()),
    }
}

/// Find the line a user means by product ID plus any options they gave.
fn resolve_line(
    snapshot: &CartSnapshot,
    id: i64,
    color: Option<&str>,
    size: Option<&str>,
) -> Result<LineKey, CliError> {
    let product_id = ProductId::new(id);
    let matches: Vec<&LineKey> = snapshot
        .lines()
        .iter()
        .map(|line| &line.key)
        .filter(|key| key.product_id == product_id)
        .filter(|key| color.is_none_or(|c| key.color.as_deref() == Some(c)))
        .filter(|key| size.is_none_or(|s| key.size.as_deref() == Some(s)))
        .collect();

    match matches.as_slice() {
        [key] => Ok((*key).clone()),
        [] => Err(CliError::InvalidArgument(format!(
            "product {id} is not in the cart with those options"
        ))),
        several => Err(CliError::InvalidArgument(format!(
            "product {id} matches {} lines, pass --color and --size",
            several.len()
        ))),
    }
}
