// [libs/infra/db-turso/src/repositories/credential.rs]
/*!
 * =================================================================
 * APARATO: NODE CREDENTIAL REPOSITORY (V4.2 - ONE-SHOT ATOMIC)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: SECRETOS POR NODO Y TOKENS DE REGISTRO ÚNICOS
 *
 * # Mathematical Proof (Single Winner):
 * La consumición del token es un único UPDATE con predicado
 * 'consumed_at IS NULL'. Bajo N solicitantes concurrentes, SQLite
 * serializa la escritura: exactamente uno observa affected == 1.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::{fmt_ts, parse_ts};
use crate::TursoClient;
use chrono::Utc;
use libsql::params;
use tracing::{info, instrument};
use wopr_domain_models::RegistrationToken;

pub struct NodeCredentialRepository {
    database_client: TursoClient,
}

impl NodeCredentialRepository {
    pub fn new(client: TursoClient) -> Self {
        Self { database_client: client }
    }

    /// Almacena el hash SHA-256 del secreto persistente de un nodo.
    ///
    /// El secreto en claro jamás toca el sustrato; solo su huella.
    pub async fn store_secret_hash(&self, node_id: &str, hashed_secret: &str) -> Result<(), DbError> {
        let database_connection = self.database_client.get_connection()?;
        database_connection
            .execute(
                "INSERT INTO node_secrets (node_id, hashed_secret) VALUES (?1, ?2) \
                 ON CONFLICT(node_id) DO UPDATE SET hashed_secret = excluded.hashed_secret",
                params![node_id, hashed_secret],
            )
            .await?;
        Ok(())
    }

    /// Resuelve el nodo dueño de una huella de secreto (vía 2 del registro).
    pub async fn find_node_by_secret_hash(&self, hashed_secret: &str) -> Result<Option<String>, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let mut query_results = database_connection
            .query(
                "SELECT node_id FROM node_secrets WHERE hashed_secret = ?1",
                params![hashed_secret],
            )
            .await?;

        match query_results.next().await? {
            Some(data_row) => Ok(Some(data_row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Emite un token de registro one-shot para el aprovisionador.
    #[instrument(skip(self))]
    pub async fn issue_token(&self, token: &str, user_id: &str, label: &str) -> Result<RegistrationToken, DbError> {
        let database_connection = self.database_client.get_connection()?;
        let now = Utc::now();
        database_connection
            .execute(
                "INSERT INTO registration_tokens (token, user_id, label, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![token, user_id, label, fmt_ts(now)],
            )
            .await?;

        Ok(RegistrationToken {
            token: token.to_string(),
            user_id: user_id.to_string(),
            label: label.to_string(),
            consumed_at: None,
            created_at: now,
        })
    }

    /**
     * Consume el token de forma atómica (one-shot).
     *
     * # Errors:
     * `TokenUnavailable` si el token no existe o ya fue consumido; el
     * UPDATE condicionado decide al único ganador bajo concurrencia.
     */
    #[instrument(skip(self, token))]
    pub async fn consume_token(&self, token: &str) -> Result<RegistrationToken, DbError> {
        let database_connection = self.database_client.get_connection()?;

        let affected = database_connection
            .execute(
                "UPDATE registration_tokens SET consumed_at = ?1 \
                 WHERE token = ?2 AND consumed_at IS NULL",
                params![fmt_ts(Utc::now()), token],
            )
            .await?;

        if affected == 0 {
            return Err(DbError::TokenUnavailable);
        }

        info!("🎫 [TOKEN_CONSUMED]: One-shot registration token burned.");

        let mut query_results = database_connection
            .query(
                "SELECT token, user_id, label, consumed_at, created_at FROM registration_tokens WHERE token = ?1",
                params![token],
            )
            .await?;

        let data_row = query_results.next().await?.ok_or(DbError::TokenUnavailable)?;
        let consumed_raw: Option<String> = data_row.get(3)?;
        let created_raw: String = data_row.get(4)?;

        Ok(RegistrationToken {
            token: data_row.get(0)?,
            user_id: data_row.get(1)?,
            label: data_row.get(2)?,
            consumed_at: match consumed_raw {
                Some(raw) => Some(parse_ts(&raw)?),
                None => None,
            },
            created_at: parse_ts(&created_raw)?,
        })
    }
}
