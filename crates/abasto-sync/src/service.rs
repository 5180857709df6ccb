//! # Sync Service
//!
//! The two branch-facing halves of synchronization that are not the
//! consumer loop: publishing a sale batch (branch side of the pipe,
//! also used by tooling to replay) and the delta feed branches pull to
//! refresh their local catalog.
//!
//! The delta feed answers "what changed for branch S since T": product
//! rows, branch price overrides, and branch stock, folded into one
//! projection. Price resolution is the override when present, the base
//! price otherwise.

use chrono::{DateTime, Utc};
use rdkafka::producer::FutureProducer;
use serde::Serialize;
use tracing::info;

use abasto_core::SaleBatchMessage;
use abasto_db::Gateway;

use crate::broker::{publish, BrokerConfig};
use crate::error::SyncResult;

/// One changed product in the delta feed.
#[derive(Debug, Clone, Serialize)]
pub struct ProductoDelta {
    pub producto_id: i64,
    pub nombre: String,
    pub codigo_barras: Option<String>,
    /// Branch-effective price: override if set, base price otherwise.
    pub precio_venta: f64,
    pub activo: bool,
    /// Branch stock; `None` when the branch never stocked the product.
    pub stock_actual: Option<i64>,
}

/// Publishing and delta-feed surface.
#[derive(Clone)]
pub struct SyncService {
    gateway: Gateway,
    producer: FutureProducer,
    config: BrokerConfig,
}

impl SyncService {
    pub fn new(gateway: Gateway, producer: FutureProducer, config: BrokerConfig) -> Self {
        SyncService {
            gateway,
            producer,
            config,
        }
    }

    /// Publishes a sale batch to the ventas topic, keyed by branch so
    /// one branch's batches stay ordered.
    pub async fn publish_ventas(&self, batch: &SaleBatchMessage) -> SyncResult<()> {
        let payload = serde_json::to_string(batch)?;
        let key = batch.sucursal_id.to_string();
        publish(&self.producer, &self.config.ventas_topic, &key, &payload).await?;
        info!(
            sucursal_id = batch.sucursal_id,
            ventas = batch.ventas.len(),
            "sale batch published"
        );
        Ok(())
    }

    /// Products whose catalog row, branch price override, or branch
    /// stock changed since `since`. A branch that has never synced
    /// passes `None` and gets the full catalog.
    pub async fn inventario_updates(
        &self,
        sucursal_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<ProductoDelta>> {
        fetch_inventario_updates(&self.gateway, sucursal_id, since).await
    }
}

async fn fetch_inventario_updates(
    gateway: &Gateway,
    sucursal_id: i64,
    since: Option<DateTime<Utc>>,
) -> SyncResult<Vec<ProductoDelta>> {
    let since = since.unwrap_or(DateTime::UNIX_EPOCH);
    let rows = gateway
        .fetch(
            "SELECT p.id AS producto_id, p.nombre, p.codigo_barras, \
                    COALESCE(pp.precio_venta, p.precio_venta) AS precio_venta, \
                    p.activo, i.stock_actual \
               FROM productos p \
               LEFT JOIN productos_precios_sucursal pp \
                      ON pp.producto_id = p.id AND pp.sucursal_id = $1 \
               LEFT JOIN inventario_sucursal i \
                      ON i.producto_id = p.id AND i.sucursal_id = $1 \
              WHERE p.updated_at > $2 \
                 OR pp.updated_at > $2 \
                 OR i.updated_at > $2 \
              ORDER BY p.id",
            &[sucursal_id.into(), since.into()],
        )
        .await?;
    rows.into_iter()
        .map(|r| {
            Ok(ProductoDelta {
                producto_id: r.get_i64("producto_id")?,
                nombre: r.get_str("nombre")?.to_string(),
                codigo_barras: r.get_opt_str("codigo_barras")?.map(str::to_string),
                precio_venta: r.get_f64("precio_venta")?,
                activo: r.get_bool("activo")?,
                stock_actual: r.get_opt_i64("stock_actual")?,
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use abasto_db::GatewayConfig;
    use chrono::Duration;

    async fn seeded_gateway() -> Gateway {
        let gateway = Gateway::connect(GatewayConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        for nombre in ["Centro", "Norte"] {
            gateway
                .execute(
                    "INSERT INTO sucursales (nombre, created_at) VALUES ($1, $2)",
                    &[nombre.into(), now.into()],
                )
                .await
                .unwrap();
        }
        gateway
            .execute(
                "INSERT INTO productos (nombre, codigo_barras, precio_venta, updated_at) \
                 VALUES ($1, $2, $3, $4)",
                &["Cafe 500g".into(), "750100".into(), 100.0.into(), now.into()],
            )
            .await
            .unwrap();
        // branch 1 sells it cheaper
        gateway
            .execute(
                "INSERT INTO productos_precios_sucursal \
                 (producto_id, sucursal_id, precio_venta, updated_at) \
                 VALUES (1, 1, $1, $2)",
                &[90.0.into(), now.into()],
            )
            .await
            .unwrap();
        gateway
            .execute(
                "INSERT INTO inventario_sucursal \
                 (sucursal_id, producto_id, stock_actual, stock_minimo, updated_at) \
                 VALUES (1, 1, 25, 0, $1)",
                &[now.into()],
            )
            .await
            .unwrap();
        gateway
    }

    #[tokio::test]
    async fn delta_feed_resolves_branch_price_override() {
        let gateway = seeded_gateway().await;
        let since = Some(Utc::now() - Duration::hours(1));

        let branch1 = fetch_inventario_updates(&gateway, 1, since).await.unwrap();
        assert_eq!(branch1.len(), 1);
        assert_eq!(branch1[0].precio_venta, 90.0);
        assert_eq!(branch1[0].stock_actual, Some(25));
        assert_eq!(branch1[0].codigo_barras.as_deref(), Some("750100"));

        // branch 2 has no override and no stock row
        let branch2 = fetch_inventario_updates(&gateway, 2, since).await.unwrap();
        assert_eq!(branch2.len(), 1);
        assert_eq!(branch2[0].precio_venta, 100.0);
        assert_eq!(branch2[0].stock_actual, None);
    }

    #[tokio::test]
    async fn omitted_cursor_returns_the_full_catalog() {
        let gateway = seeded_gateway().await;
        let deltas = fetch_inventario_updates(&gateway, 1, None).await.unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].nombre, "Cafe 500g");
    }

    #[tokio::test]
    async fn delta_feed_is_empty_when_nothing_changed() {
        let gateway = seeded_gateway().await;
        let since = Some(Utc::now() + Duration::hours(1));
        let deltas = fetch_inventario_updates(&gateway, 1, since).await.unwrap();
        assert!(deltas.is_empty());
    }
}
