//! Customer repository for `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use souq_core::{CustomerId, Email, PhoneNumber};

use super::{CustomerRepository, RepositoryError};
use crate::models::{Customer, NewCustomer};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: i32,
    email: String,
    name: String,
    phone: Option<PhoneNumber>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        Ok(Self {
            id: CustomerId::new(row.id),
            email,
            name: row.name,
            phone: row.phone,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerWithPasswordRow {
    #[sqlx(flatten)]
    customer: CustomerRow,
    password_hash: Option<String>,
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL`-backed [`CustomerRepository`].
#[derive(Clone)]
pub struct PgCustomerRepository {
    pool: PgPool,
}

impl PgCustomerRepository {
    /// Create a new customer repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    #[instrument(skip(self), fields(email = %email))]
    async fn find_by_email(&self, email: &Email) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r"
            SELECT id, email, name, phone, created_at
            FROM storefront.customer
            WHERE lower(email) = $1
            ",
        )
        .bind(email.normalized())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Customer::try_from).transpose()
    }

    #[instrument(skip(self, customer), fields(email = %customer.email))]
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, CustomerRow>(
            r"
            INSERT INTO storefront.customer (email, name, phone)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, phone, created_at
            ",
        )
        .bind(customer.email.as_str())
        .bind(&customer.name)
        .bind(customer.phone.as_ref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "email"))?;

        if let Some(password_hash) = &customer.password_hash {
            sqlx::query(
                r"
                INSERT INTO storefront.customer_password (customer_id, password_hash)
                VALUES ($1, $2)
                ",
            )
            .bind(row.id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Customer::try_from(row)
    }

    #[instrument(skip(self), fields(email = %email))]
    async fn password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(Customer, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerWithPasswordRow>(
            r"
            SELECT c.id, c.email, c.name, c.phone, c.created_at, p.password_hash
            FROM storefront.customer c
            LEFT JOIN storefront.customer_password p ON c.id = p.customer_id
            WHERE lower(c.email) = $1
            ",
        )
        .bind(email.normalized())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Some(password_hash) = row.password_hash else {
            return Ok(None);
        };

        Ok(Some((Customer::try_from(row.customer)?, password_hash)))
    }
}
