//! One-time-password lookup and related test-data setup.
//!
//! The OTP for a phone number is found through two dependent reads followed
//! by the OTP read itself:
//!
//! ```text
//! phone number -> phone-number id -> user-login id -> latest OTP
//! ```
//!
//! The whole chain runs once per attempt on a fresh connection under
//! [`fetch_with_retry`]. No OTP yet (the message has not landed) is retried.
//! A missing phone-number or user-login row means the account does not exist
//! and aborts the fetch with [`StoreError::MissingRow`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::store::{DataStore, KeyedUpdate, PointQuery, StoreConnection, StoreError};

/// Table and column names used by the lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpSchema {
    pub phone_table: String,
    pub phone_number_column: String,
    pub phone_id_column: String,

    pub login_table: String,
    pub login_phone_id_column: String,
    pub login_id_column: String,

    pub otp_table: String,
    pub otp_login_column: String,
    pub otp_column: String,
    pub otp_modified_column: String,

    pub wallet_table: String,
    pub wallet_login_column: String,
    pub wallet_amount_column: String,
    pub wallet_currency_column: String,
    pub wallet_currency: String,
}

impl Default for OtpSchema {
    fn default() -> Self {
        Self {
            phone_table: "[Demographics].[PhoneNumber]".into(),
            phone_number_column: "Number".into(),
            phone_id_column: "PhoneNumberId".into(),
            login_table: "[User].[UserLogin]".into(),
            login_phone_id_column: "PhoneNumberId".into(),
            login_id_column: "UserLoginId".into(),
            otp_table: "[Demographics].[MessageOTP]".into(),
            otp_login_column: "UserLoginId".into(),
            otp_column: "OtpNumber".into(),
            otp_modified_column: "ModifiedDate".into(),
            wallet_table: "[Transaction].[UserCalculatedWallet]".into(),
            wallet_login_column: "UserLoginId".into(),
            wallet_amount_column: "Amount".into(),
            wallet_currency_column: "Currency".into(),
            wallet_currency: "INR".into(),
        }
    }
}

/// Fetches OTPs and prepares wallet balances for a phone number.
pub struct OtpFetcher {
    store: Arc<dyn DataStore>,
    schema: OtpSchema,
    policy: RetryPolicy,
}

impl OtpFetcher {
    pub fn new(store: Arc<dyn DataStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            schema: OtpSchema::default(),
            policy,
        }
    }

    pub fn with_schema(mut self, schema: OtpSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn schema(&self) -> &OtpSchema {
        &self.schema
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The most recent OTP sent to `phone`.
    ///
    /// # Errors
    ///
    /// - [`Error::DataNotFound`] when no OTP appears within the retry budget.
    /// - [`Error::Store`] with [`StoreError::MissingRow`] when the phone
    ///   number or its login does not exist.
    pub async fn fetch_otp(&self, phone: &str) -> Result<String> {
        let subject = format!("OTP for {phone}");
        fetch_with_retry(&subject, &self.policy, |attempt| async move {
            debug!(attempt, "connecting for OTP lookup");
            let mut conn = self.store.connect().await?;
            let login_id = self.user_login_id(conn.as_mut(), phone).await?;

            let s = &self.schema;
            let query = PointQuery::new(&s.otp_table, &s.otp_login_column, login_id)
                .select(&s.otp_column)
                .latest_by(&s.otp_modified_column);
            let otp = conn
                .lookup(&query)
                .await?
                .and_then(|row| row.string(&s.otp_column))
                .filter(|otp| !otp.trim().is_empty());
            Ok::<_, Error>(otp)
        })
        .await
    }

    /// Set the wallet amount for the account behind `phone`.
    ///
    /// Returns the number of wallet rows changed. Zero is logged as a warning,
    /// not treated as an error.
    pub async fn update_wallet_amount(&self, phone: &str, amount: &str) -> Result<u64> {
        let mut conn = self.store.connect().await?;
        let login_id = self.user_login_id(conn.as_mut(), phone).await?;

        let update = KeyedUpdate::new(&self.schema.wallet_table)
            .set(&self.schema.wallet_amount_column, amount)
            .filter(&self.schema.wallet_currency_column, self.schema.wallet_currency.as_str())
            .filter(&self.schema.wallet_login_column, login_id);
        let changed = conn.update(&update).await?;

        if changed > 0 {
            info!(login_id, amount, "wallet updated");
        } else {
            warn!(login_id, "wallet update matched no rows");
        }
        Ok(changed)
    }

    async fn user_login_id(
        &self,
        conn: &mut dyn StoreConnection,
        phone: &str,
    ) -> Result<i64, StoreError> {
        let s = &self.schema;

        let phone_id = required_int(
            conn,
            PointQuery::new(&s.phone_table, &s.phone_number_column, phone)
                .select(&s.phone_id_column),
            &s.phone_id_column,
        )
        .await?;
        debug!(phone_id, "resolved phone number id");

        let login_id = required_int(
            conn,
            PointQuery::new(&s.login_table, &s.login_phone_id_column, phone_id)
                .select(&s.login_id_column),
            &s.login_id_column,
        )
        .await?;
        debug!(login_id, "resolved user login id");

        Ok(login_id)
    }
}

/// Integer `column` of the row matching `query`; the row must exist.
async fn required_int(
    conn: &mut dyn StoreConnection,
    query: PointQuery,
    column: &str,
) -> Result<i64, StoreError> {
    let row = conn
        .lookup(&query)
        .await?
        .ok_or_else(|| StoreError::MissingRow {
            table: query.table.clone(),
            key: query.key.to_string(),
        })?;
    row.int(column).ok_or_else(|| StoreError::MissingColumn {
        table: query.table.clone(),
        column: column.to_string(),
    })
}

impl std::fmt::Debug for OtpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpFetcher")
            .field("store", &"<dyn DataStore>")
            .field("schema", &self.schema)
            .field("policy", &self.policy)
            .finish()
    }
}
