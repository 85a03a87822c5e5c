//! Stored-balance ledger.
//!
//! Every movement is written to `wallet_transactions` under a caller-chosen
//! reference. Replaying a reference is a no-op that returns the original
//! ledger row.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        wallet,
        wallet_transaction::{self, WalletTransactionKind},
    },
    errors::ServiceError,
    money::round_money,
};

async fn existing_entry<C: ConnectionTrait>(
    conn: &C,
    reference: &str,
) -> Result<Option<wallet_transaction::Model>, ServiceError> {
    Ok(wallet_transaction::Entity::find()
        .filter(wallet_transaction::Column::Reference.eq(reference))
        .one(conn)
        .await?)
}

async fn wallet_for<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<wallet::Model>, ServiceError> {
    Ok(wallet::Entity::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

fn positive(amount: Decimal) -> Result<Decimal, ServiceError> {
    let amount = round_money(amount);
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "wallet amounts must be positive".into(),
        ));
    }
    Ok(amount)
}

/// Debits `amount` from the user's available balance.
///
/// Fails with `PaymentFailed` when the user has no wallet at all.
#[instrument(skip(conn), fields(user_id = %user_id, %amount, reference = %reference))]
pub async fn debit<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    amount: Decimal,
    reference: &str,
    description: &str,
) -> Result<wallet_transaction::Model, ServiceError> {
    let amount = positive(amount)?;

    if let Some(entry) = existing_entry(conn, reference).await? {
        info!("wallet debit already applied");
        return Ok(entry);
    }

    let Some(current) = wallet_for(conn, user_id).await? else {
        return Err(ServiceError::PaymentFailed(format!(
            "no stored balance wallet for user {}",
            user_id
        )));
    };
    debit_from(conn, &current, amount, reference, description).await
}

/// Debits against a wallet the caller has already read.
///
/// The write is a single conditional update: it only lands while the hold
/// is still the one in `current` and `balance >= amount + hold_amount`, so
/// two concurrent debits cannot overdraw the wallet.
pub async fn debit_from<C: ConnectionTrait>(
    conn: &C,
    current: &wallet::Model,
    amount: Decimal,
    reference: &str,
    description: &str,
) -> Result<wallet_transaction::Model, ServiceError> {
    let amount = positive(amount)?;
    let user_id = current.user_id;
    if current.available() < amount {
        return Err(ServiceError::InsufficientWalletBalance {
            required: amount,
            available: round_money(current.available()),
        });
    }

    let now = Utc::now();
    let result = wallet::Entity::update_many()
        .col_expr(
            wallet::Column::Balance,
            Expr::col(wallet::Column::Balance).sub(amount),
        )
        .col_expr(wallet::Column::UpdatedAt, Expr::value(now))
        .filter(wallet::Column::Id.eq(current.id))
        .filter(wallet::Column::HoldAmount.eq(current.hold_amount))
        .filter(wallet::Column::Balance.gte(current.hold_amount + amount))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let available = wallet_for(conn, user_id)
            .await?
            .map(|w| round_money(w.available()))
            .unwrap_or(Decimal::ZERO);
        warn!(%user_id, %available, "wallet debit lost a concurrent update");
        return Err(ServiceError::InsufficientWalletBalance {
            required: amount,
            available,
        });
    }

    let updated = wallet_for(conn, user_id)
        .await?
        .ok_or_else(|| ServiceError::InternalError(format!("wallet for {} vanished", user_id)))?;

    let entry = wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        wallet_id: Set(updated.id),
        user_id: Set(user_id),
        kind: Set(WalletTransactionKind::Debit),
        amount: Set(amount),
        balance_after: Set(round_money(updated.balance)),
        reference: Set(reference.to_string()),
        description: Set(description.to_string()),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    info!(balance_after = %entry.balance_after, "wallet debited");
    Ok(entry)
}

/// Credits `amount` to the user's wallet, opening one if needed.
#[instrument(skip(conn), fields(user_id = %user_id, %amount, reference = %reference))]
pub async fn credit<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    amount: Decimal,
    currency: &str,
    reference: &str,
    description: &str,
) -> Result<wallet_transaction::Model, ServiceError> {
    let amount = positive(amount)?;

    if let Some(entry) = existing_entry(conn, reference).await? {
        info!("wallet credit already applied");
        return Ok(entry);
    }

    let now = Utc::now();
    let wallet_id = match wallet_for(conn, user_id).await? {
        Some(w) => w.id,
        None => {
            wallet::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                balance: Set(Decimal::ZERO),
                hold_amount: Set(Decimal::ZERO),
                currency: Set(currency.to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?
            .id
        }
    };

    wallet::Entity::update_many()
        .col_expr(
            wallet::Column::Balance,
            Expr::col(wallet::Column::Balance).add(amount),
        )
        .col_expr(wallet::Column::UpdatedAt, Expr::value(now))
        .filter(wallet::Column::Id.eq(wallet_id))
        .exec(conn)
        .await?;

    let balance_after = wallet::Entity::find_by_id(wallet_id)
        .one(conn)
        .await?
        .map(|w| round_money(w.balance))
        .unwrap_or(amount);

    let entry = wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        wallet_id: Set(wallet_id),
        user_id: Set(user_id),
        kind: Set(WalletTransactionKind::Credit),
        amount: Set(amount),
        balance_after: Set(balance_after),
        reference: Set(reference.to_string()),
        description: Set(description.to_string()),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    info!(%balance_after, "wallet credited");
    Ok(entry)
}
