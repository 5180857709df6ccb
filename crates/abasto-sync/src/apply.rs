//! # Batch Application
//!
//! Applies one sale batch inside one database transaction.
//!
//! ## Idempotency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                One Batch = One Transaction                              │
//! │                                                                         │
//! │  for venta in batch:                                                   │
//! │      venta.id already in ventas?  → skip (replay), log, continue       │
//! │      insert ventas (sincronizado = true)                               │
//! │      insert ventas_detalle per item                                    │
//! │      insert metodos_pago per payment                                   │
//! │      ledger debit per item (tipo 'venta', referencia = venta.id)       │
//! │                                                                         │
//! │  any failure → whole transaction rolls back, nothing half-applied     │
//! │  redelivered batch → every sale skips, zero stock change              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale ids are generated at the branch and survive replays unchanged,
//! which is what makes the existence check sufficient.

use chrono::Utc;
use tracing::{debug, info};

use abasto_core::{MovementKind, SaleBatchMessage, Venta};
use abasto_db::{Gateway, GatewayClient};
use abasto_inventory::{debit_stock, MovementContext};

use crate::error::{SyncError, SyncResult};

/// What happened to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Sales newly written by this application.
    pub applied: usize,
    /// Sales skipped because they were already present (replay).
    pub skipped: usize,
}

/// Applies a sale batch transactionally.
///
/// All-or-nothing: either every non-duplicate sale in the batch lands
/// (rows plus stock debits plus movement entries) or none do.
pub async fn apply_batch(gateway: &Gateway, batch: &SaleBatchMessage) -> SyncResult<BatchOutcome> {
    let owned = batch.clone();
    let outcome = gateway
        .transaction(|client| {
            Box::pin(async move {
                let mut applied = 0usize;
                let mut skipped = 0usize;
                for venta in &owned.ventas {
                    if sale_exists(client, &venta.id).await? {
                        debug!(venta_id = %venta.id, "venta already applied, skipping");
                        skipped += 1;
                        continue;
                    }
                    apply_sale(client, owned.sucursal_id, venta).await?;
                    applied += 1;
                }
                Ok::<_, SyncError>(BatchOutcome { applied, skipped })
            })
        })
        .await?;

    info!(
        sucursal_id = batch.sucursal_id,
        applied = outcome.applied,
        skipped = outcome.skipped,
        "sale batch applied"
    );
    Ok(outcome)
}

async fn sale_exists(client: &mut GatewayClient, venta_id: &str) -> SyncResult<bool> {
    let row = client
        .fetch_optional("SELECT 1 AS uno FROM ventas WHERE id = $1", &[venta_id.into()])
        .await?;
    Ok(row.is_some())
}

async fn apply_sale(
    client: &mut GatewayClient,
    sucursal_id: i64,
    venta: &Venta,
) -> SyncResult<()> {
    let now = Utc::now();

    client
        .execute(
            "INSERT INTO ventas \
                (id, sucursal_id, caja_id, empleado_id, cliente_id, subtotal, \
                 impuestos, total, estado, origen, sincronizado, fecha_venta, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            &[
                venta.id.as_str().into(),
                sucursal_id.into(),
                venta.caja_id.into(),
                venta.empleado_id.into(),
                venta.cliente_id.into(),
                venta.subtotal.into(),
                venta.impuestos.into(),
                venta.total.into(),
                venta.estado.as_str().into(),
                venta.origen.as_str().into(),
                true.into(),
                venta.fecha_venta.into(),
                now.into(),
            ],
        )
        .await?;

    for item in &venta.items {
        client
            .execute(
                "INSERT INTO ventas_detalle \
                    (venta_id, producto_id, nombre_producto, cantidad, \
                     precio_unitario, subtotal) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    venta.id.as_str().into(),
                    item.producto_id.into(),
                    item.nombre_producto.as_str().into(),
                    item.cantidad.into(),
                    item.precio_unitario.into(),
                    item.subtotal.into(),
                ],
            )
            .await?;

        debit_stock(
            client,
            sucursal_id,
            item.producto_id,
            item.cantidad,
            MovementKind::Venta,
            MovementContext {
                referencia_id: Some(&venta.id),
                empleado_id: Some(venta.empleado_id),
                observaciones: None,
            },
        )
        .await?;
    }

    for pago in &venta.pagos {
        client
            .execute(
                "INSERT INTO metodos_pago (venta_id, metodo, monto, referencia) \
                 VALUES ($1, $2, $3, $4)",
                &[
                    venta.id.as_str().into(),
                    pago.metodo.as_str().into(),
                    pago.monto.into(),
                    pago.referencia.clone().into(),
                ],
            )
            .await?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use abasto_core::{DomainError, VentaItem, VentaPago};
    use abasto_db::GatewayConfig;
    use abasto_inventory::{Inventory, InventoryError};

    async fn seeded_gateway() -> Gateway {
        let gateway = Gateway::connect(GatewayConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        gateway
            .execute(
                "INSERT INTO sucursales (nombre, created_at) VALUES ($1, $2)",
                &["Centro".into(), now.into()],
            )
            .await
            .unwrap();
        for (nombre, stock) in [("Cafe 500g", 40i64), ("Pan blanco", 12)] {
            gateway
                .execute(
                    "INSERT INTO productos (nombre, precio_venta, updated_at) \
                     VALUES ($1, $2, $3)",
                    &[nombre.into(), 50.0.into(), now.into()],
                )
                .await
                .unwrap();
            let producto_id = gateway
                .fetch_one("SELECT id FROM productos WHERE nombre = $1", &[nombre.into()])
                .await
                .unwrap()
                .get_i64("id")
                .unwrap();
            gateway
                .execute(
                    "INSERT INTO inventario_sucursal \
                     (sucursal_id, producto_id, stock_actual, stock_minimo, updated_at) \
                     VALUES (1, $1, $2, 0, $3)",
                    &[producto_id.into(), stock.into(), now.into()],
                )
                .await
                .unwrap();
        }
        gateway
    }

    fn venta(id: &str, producto_id: i64, cantidad: i64) -> Venta {
        Venta {
            id: id.to_string(),
            caja_id: 1,
            empleado_id: 3,
            cliente_id: None,
            subtotal: 150.0,
            impuestos: 24.0,
            total: 174.0,
            estado: "completada".to_string(),
            origen: "pos".to_string(),
            fecha_venta: Utc::now(),
            items: vec![VentaItem {
                producto_id,
                cantidad,
                precio_unitario: 50.0,
                subtotal: 150.0,
                nombre_producto: "Cafe 500g".to_string(),
            }],
            pagos: vec![VentaPago {
                metodo: "efectivo".to_string(),
                monto: 174.0,
                referencia: None,
            }],
        }
    }

    fn batch(ventas: Vec<Venta>) -> SaleBatchMessage {
        SaleBatchMessage {
            sucursal_id: 1,
            ventas,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sale_debits_stock_and_writes_venta_movement() {
        let gateway = seeded_gateway().await;
        let outcome = apply_batch(&gateway, &batch(vec![venta("S1-0001", 1, 3)]))
            .await
            .unwrap();
        assert_eq!(outcome, BatchOutcome { applied: 1, skipped: 0 });

        let inv = Inventory::new(gateway.clone());
        assert_eq!(inv.get_stock(1, 1).await.unwrap(), Some(37));

        let movs = inv.get_movimientos(1, 1, 10).await.unwrap();
        assert_eq!(movs.len(), 1);
        assert_eq!(movs[0].tipo_movimiento, "venta");
        assert_eq!(movs[0].referencia_id.as_deref(), Some("S1-0001"));

        let row = gateway
            .fetch_one(
                "SELECT sincronizado FROM ventas WHERE id = $1",
                &["S1-0001".into()],
            )
            .await
            .unwrap();
        assert!(row.get_bool("sincronizado").unwrap());
    }

    #[tokio::test]
    async fn replayed_batch_is_a_complete_no_op() {
        let gateway = seeded_gateway().await;
        let b = batch(vec![venta("S1-0001", 1, 3), venta("S1-0002", 2, 1)]);

        let first = apply_batch(&gateway, &b).await.unwrap();
        assert_eq!(first, BatchOutcome { applied: 2, skipped: 0 });

        let replay = apply_batch(&gateway, &b).await.unwrap();
        assert_eq!(replay, BatchOutcome { applied: 0, skipped: 2 });

        let inv = Inventory::new(gateway.clone());
        assert_eq!(inv.get_stock(1, 1).await.unwrap(), Some(37));
        assert_eq!(inv.get_stock(1, 2).await.unwrap(), Some(11));

        // no duplicate detail or payment rows either
        let n = gateway
            .fetch_one("SELECT COUNT(*) AS n FROM ventas_detalle", &[])
            .await
            .unwrap()
            .get_i64("n")
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn failing_sale_rolls_back_the_whole_batch() {
        let gateway = seeded_gateway().await;
        // second sale references a product with no inventory row
        let b = batch(vec![venta("S1-0001", 1, 3), venta("S1-0002", 999, 1)]);

        let err = apply_batch(&gateway, &b).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Inventory(InventoryError::Domain(
                DomainError::MissingInventoryRecord { .. }
            ))
        ));
        assert!(!err.is_retryable());

        // the first sale must not have landed
        let inv = Inventory::new(gateway.clone());
        assert_eq!(inv.get_stock(1, 1).await.unwrap(), Some(40));
        let n = gateway
            .fetch_one("SELECT COUNT(*) AS n FROM ventas", &[])
            .await
            .unwrap()
            .get_i64("n")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn failing_line_item_rolls_back_the_whole_sale() {
        let gateway = seeded_gateway().await;
        // one sale, two items; the second references a product with no
        // inventory row, so its debit fails after the first already ran
        let mut v = venta("S1-0005", 1, 3);
        v.items.push(VentaItem {
            producto_id: 999,
            cantidad: 1,
            precio_unitario: 50.0,
            subtotal: 50.0,
            nombre_producto: "Fantasma".to_string(),
        });

        let err = apply_batch(&gateway, &batch(vec![v])).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Inventory(InventoryError::Domain(
                DomainError::MissingInventoryRecord { .. }
            ))
        ));

        // the first item's debit must have been undone with everything else
        let inv = Inventory::new(gateway.clone());
        assert_eq!(inv.get_stock(1, 1).await.unwrap(), Some(40));
        for table in ["ventas", "ventas_detalle", "movimientos_inventario"] {
            let n = gateway
                .fetch_one(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
                .await
                .unwrap()
                .get_i64("n")
                .unwrap();
            assert_eq!(n, 0, "{table} should be empty after rollback");
        }
    }

    #[tokio::test]
    async fn oversold_sale_is_refused_not_negated() {
        let gateway = seeded_gateway().await;
        let err = apply_batch(&gateway, &batch(vec![venta("S1-0003", 2, 13)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Inventory(InventoryError::Domain(DomainError::InsufficientStock {
                disponible: 12,
                ..
            }))
        ));
    }
}
