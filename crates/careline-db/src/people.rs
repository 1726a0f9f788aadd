//! Patient, doctor and person repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use careline_core::{Doctor, Error, Patient, PeopleRepository, Person, Result, RoleType};

/// Role stored on the person row. Care coordinators are doctor records.
pub(crate) fn stored_role(role: RoleType) -> &'static str {
    match role {
        RoleType::Patient => RoleType::Patient.as_str(),
        RoleType::Doctor | RoleType::CareCoordinator => RoleType::Doctor.as_str(),
    }
}

pub(crate) fn parse_person_row(row: &sqlx::postgres::PgRow) -> Result<Person> {
    Ok(Person {
        id: row.get("id"),
        role_type: row.get::<String, _>("role_type").parse()?,
        role_id: row.get("role_id"),
    })
}

fn parse_patient_row(row: &sqlx::postgres::PgRow) -> Patient {
    Patient {
        id: row.get("id"),
        account_id: row.get("account_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
    }
}

fn parse_doctor_row(row: &sqlx::postgres::PgRow) -> Doctor {
    Doctor {
        id: row.get("id"),
        account_id: row.get("account_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        short_display_name: row.get("short_display_name"),
        long_display_name: row.get("long_display_name"),
    }
}

/// PostgreSQL implementation of PeopleRepository.
pub struct PgPeopleRepository {
    pool: Pool<Postgres>,
}

impl PgPeopleRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Register a patient together with their person row.
    pub async fn create_patient(
        &self,
        account_id: i64,
        first_name: &str,
        last_name: &str,
    ) -> Result<Patient> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let row = sqlx::query(
            "INSERT INTO patient (account_id, first_name, last_name)
             VALUES ($1, $2, $3)
             RETURNING id, account_id, first_name, last_name",
        )
        .bind(account_id)
        .bind(first_name)
        .bind(last_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let patient = parse_patient_row(&row);

        sqlx::query("INSERT INTO person (role_type, role_id) VALUES ($1, $2)")
            .bind(stored_role(RoleType::Patient))
            .bind(patient.id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(patient)
    }

    /// Register a doctor or care coordinator together with their person row.
    pub async fn create_doctor(
        &self,
        account_id: i64,
        first_name: &str,
        last_name: &str,
    ) -> Result<Doctor> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let row = sqlx::query(
            "INSERT INTO doctor (account_id, first_name, last_name, short_display_name, long_display_name)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, account_id, first_name, last_name, short_display_name, long_display_name",
        )
        .bind(account_id)
        .bind(first_name)
        .bind(last_name)
        .bind(format!("Dr. {}", last_name))
        .bind(format!("Dr. {} {}", first_name, last_name))
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let doctor = parse_doctor_row(&row);

        sqlx::query("INSERT INTO person (role_type, role_id) VALUES ($1, $2)")
            .bind(stored_role(RoleType::Doctor))
            .bind(doctor.id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(doctor)
    }
}

#[async_trait]
impl PeopleRepository for PgPeopleRepository {
    async fn get_people(&self, ids: &[i64]) -> Result<HashMap<i64, Person>> {
        let rows = sqlx::query("SELECT id, role_type, role_id FROM person WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter()
            .map(|row| parse_person_row(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn person_id_for_role(&self, role: RoleType, role_id: i64) -> Result<i64> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM person WHERE role_type = $1 AND role_id = $2")
                .bind(stored_role(role))
                .bind(role_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        id.ok_or_else(|| Error::NotFound(format!("person for {} {}", role, role_id)))
    }

    async fn patient(&self, patient_id: i64) -> Result<Patient> {
        let row = sqlx::query("SELECT id, account_id, first_name, last_name FROM patient WHERE id = $1")
            .bind(patient_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(|r| parse_patient_row(&r))
            .ok_or_else(|| Error::NotFound(format!("patient {}", patient_id)))
    }

    async fn doctor(&self, doctor_id: i64) -> Result<Doctor> {
        let row = sqlx::query(
            "SELECT id, account_id, first_name, last_name, short_display_name, long_display_name
             FROM doctor WHERE id = $1",
        )
        .bind(doctor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.map(|r| parse_doctor_row(&r))
            .ok_or_else(|| Error::NotFound(format!("doctor {}", doctor_id)))
    }

    async fn patient_id_for_account(&self, account_id: i64) -> Result<i64> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM patient WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        id.ok_or_else(|| Error::NotFound(format!("patient for account {}", account_id)))
    }

    async fn doctor_id_for_account(&self, account_id: i64) -> Result<i64> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM doctor WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        id.ok_or_else(|| Error::NotFound(format!("doctor for account {}", account_id)))
    }
}
