//! # Stock Ledger
//!
//! The paired writers behind every stock mutation, plus read
//! projections over balances and movement history.
//!
//! ## The Pair
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              One Mutation = Balance Update + Movement Row               │
//! │                                                                         │
//! │  debit_stock:                                                          │
//! │    UPDATE inventario_sucursal                                          │
//! │       SET stock_actual = stock_actual - n                              │
//! │     WHERE sucursal = s AND producto = p AND stock_actual >= n          │
//! │    RETURNING stock_actual          ← atomic guard, no read-then-write │
//! │    INSERT movimientos_inventario (anterior, nuevo, tipo, referencia)  │
//! │                                                                         │
//! │  credit_stock:                                                         │
//! │    INSERT … ON CONFLICT DO UPDATE  ← first receipt creates the row    │
//! │    RETURNING stock_actual                                              │
//! │    INSERT movimientos_inventario                                       │
//! │                                                                         │
//! │  Both run on the caller's GatewayClient: the enclosing transaction     │
//! │  decides atomicity, the guard decides legality.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Zero rows from the guarded UPDATE means one of two things, and the
//! distinction matters to callers: no inventory row at all
//! (`MissingInventoryRecord`) or a row with too little stock
//! (`InsufficientStock`). A follow-up SELECT disambiguates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use abasto_core::{DomainError, MovementKind};
use abasto_db::{Gateway, GatewayClient};

use crate::error::InventoryResult;

// =============================================================================
// Pair Writers
// =============================================================================

/// Context recorded with a movement row.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementContext<'a> {
    /// Business document this movement belongs to (sale id, transfer id).
    pub referencia_id: Option<&'a str>,
    pub empleado_id: Option<i64>,
    pub observaciones: Option<&'a str>,
}

/// Debits `cantidad` units from one branch/product balance.
///
/// Guarded: the balance never goes negative. Returns
/// `(stock_anterior, stock_nuevo)`.
///
/// ## Errors
/// * [`DomainError::NonPositiveQuantity`] - `cantidad < 1`
/// * [`DomainError::MissingInventoryRecord`] - branch never stocked
///   this product
/// * [`DomainError::InsufficientStock`] - balance below `cantidad`
pub async fn debit_stock(
    client: &mut GatewayClient,
    sucursal_id: i64,
    producto_id: i64,
    cantidad: i64,
    kind: MovementKind,
    ctx: MovementContext<'_>,
) -> InventoryResult<(i64, i64)> {
    if cantidad < 1 {
        return Err(DomainError::NonPositiveQuantity(cantidad).into());
    }

    let now = Utc::now();
    let updated = client
        .fetch_optional(
            "UPDATE inventario_sucursal \
                SET stock_actual = stock_actual - $3, updated_at = $4 \
              WHERE sucursal_id = $1 AND producto_id = $2 AND stock_actual >= $3 \
              RETURNING stock_actual",
            &[
                sucursal_id.into(),
                producto_id.into(),
                cantidad.into(),
                now.into(),
            ],
        )
        .await?;

    let stock_nuevo = match updated {
        Some(row) => row.get_i64("stock_actual")?,
        None => {
            // Guard refused: missing row or not enough stock?
            let existing = client
                .fetch_optional(
                    "SELECT stock_actual FROM inventario_sucursal \
                      WHERE sucursal_id = $1 AND producto_id = $2",
                    &[sucursal_id.into(), producto_id.into()],
                )
                .await?;
            return match existing {
                None => Err(DomainError::MissingInventoryRecord {
                    sucursal_id,
                    producto_id,
                }
                .into()),
                Some(row) => Err(DomainError::InsufficientStock {
                    sucursal_id,
                    producto_id,
                    solicitado: cantidad,
                    disponible: row.get_i64("stock_actual")?,
                }
                .into()),
            };
        }
    };
    let stock_anterior = stock_nuevo + cantidad;

    record_movement(
        client,
        sucursal_id,
        producto_id,
        kind,
        cantidad,
        stock_anterior,
        stock_nuevo,
        ctx,
        now,
    )
    .await?;

    debug!(
        sucursal_id,
        producto_id,
        cantidad,
        stock_nuevo,
        tipo = %kind,
        "stock debited"
    );
    Ok((stock_anterior, stock_nuevo))
}

/// Credits `cantidad` units to one branch/product balance.
///
/// Upserts: the first receipt of a product at a branch creates its
/// inventory row with `stock_minimo = 0`. Returns
/// `(stock_anterior, stock_nuevo)`.
pub async fn credit_stock(
    client: &mut GatewayClient,
    sucursal_id: i64,
    producto_id: i64,
    cantidad: i64,
    kind: MovementKind,
    ctx: MovementContext<'_>,
) -> InventoryResult<(i64, i64)> {
    if cantidad < 1 {
        return Err(DomainError::NonPositiveQuantity(cantidad).into());
    }

    let now = Utc::now();
    let row = client
        .fetch_one(
            "INSERT INTO inventario_sucursal \
                (sucursal_id, producto_id, stock_actual, stock_minimo, updated_at) \
             VALUES ($1, $2, $3, 0, $4) \
             ON CONFLICT (sucursal_id, producto_id) DO UPDATE \
                SET stock_actual = inventario_sucursal.stock_actual + $3, \
                    updated_at = $4 \
             RETURNING stock_actual",
            &[
                sucursal_id.into(),
                producto_id.into(),
                cantidad.into(),
                now.into(),
            ],
        )
        .await?;

    let stock_nuevo = row.get_i64("stock_actual")?;
    let stock_anterior = stock_nuevo - cantidad;

    record_movement(
        client,
        sucursal_id,
        producto_id,
        kind,
        cantidad,
        stock_anterior,
        stock_nuevo,
        ctx,
        now,
    )
    .await?;

    debug!(
        sucursal_id,
        producto_id,
        cantidad,
        stock_nuevo,
        tipo = %kind,
        "stock credited"
    );
    Ok((stock_anterior, stock_nuevo))
}

#[allow(clippy::too_many_arguments)]
async fn record_movement(
    client: &mut GatewayClient,
    sucursal_id: i64,
    producto_id: i64,
    kind: MovementKind,
    cantidad: i64,
    stock_anterior: i64,
    stock_nuevo: i64,
    ctx: MovementContext<'_>,
    at: DateTime<Utc>,
) -> InventoryResult<()> {
    client
        .execute(
            "INSERT INTO movimientos_inventario \
                (sucursal_id, producto_id, tipo_movimiento, cantidad, \
                 stock_anterior, stock_nuevo, referencia_id, empleado_id, \
                 observaciones, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                sucursal_id.into(),
                producto_id.into(),
                kind.as_str().into(),
                cantidad.into(),
                stock_anterior.into(),
                stock_nuevo.into(),
                ctx.referencia_id.into(),
                ctx.empleado_id.into(),
                ctx.observaciones.into(),
                at.into(),
            ],
        )
        .await?;
    Ok(())
}

// =============================================================================
// Read Projections
// =============================================================================

/// One branch/product balance row.
#[derive(Debug, Clone, Serialize)]
pub struct StockRow {
    pub sucursal_id: i64,
    pub producto_id: i64,
    pub nombre_producto: String,
    pub stock_actual: i64,
    pub stock_minimo: i64,
    pub updated_at: DateTime<Utc>,
}

/// Per-branch slice of a product's global stock.
#[derive(Debug, Clone, Serialize)]
pub struct StockPorSucursal {
    pub sucursal_id: i64,
    pub nombre_sucursal: String,
    pub stock_actual: i64,
}

/// Company-wide stock total for one product.
#[derive(Debug, Clone, Serialize)]
pub struct StockConsolidado {
    pub producto_id: i64,
    pub nombre_producto: String,
    pub stock_total: i64,
}

/// One movement-ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct MovimientoRow {
    pub id: i64,
    pub sucursal_id: i64,
    pub producto_id: i64,
    pub tipo_movimiento: String,
    pub cantidad: i64,
    pub stock_anterior: i64,
    pub stock_nuevo: i64,
    pub referencia_id: Option<String>,
    pub empleado_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Read-side access to balances and movement history.
#[derive(Debug, Clone)]
pub struct Inventory {
    gateway: Gateway,
}

impl Inventory {
    pub fn new(gateway: Gateway) -> Self {
        Inventory { gateway }
    }

    /// Current balance for one branch/product, if the row exists.
    pub async fn get_stock(
        &self,
        sucursal_id: i64,
        producto_id: i64,
    ) -> InventoryResult<Option<i64>> {
        let row = self
            .gateway
            .fetch_optional(
                "SELECT stock_actual FROM inventario_sucursal \
                  WHERE sucursal_id = $1 AND producto_id = $2",
                &[sucursal_id.into(), producto_id.into()],
            )
            .await?;
        Ok(match row {
            Some(r) => Some(r.get_i64("stock_actual")?),
            None => None,
        })
    }

    /// All stocked products at one branch.
    pub async fn get_inventario(&self, sucursal_id: i64) -> InventoryResult<Vec<StockRow>> {
        let rows = self
            .gateway
            .fetch(
                "SELECT i.sucursal_id, i.producto_id, p.nombre AS nombre_producto, \
                        i.stock_actual, i.stock_minimo, i.updated_at \
                   FROM inventario_sucursal i \
                   JOIN productos p ON p.id = i.producto_id \
                  WHERE i.sucursal_id = $1 \
                  ORDER BY p.nombre",
                &[sucursal_id.into()],
            )
            .await?;
        rows.into_iter().map(|r| stock_row(&r)).collect()
    }

    /// Products at or below their minimum at one branch.
    pub async fn get_stock_bajo(&self, sucursal_id: i64) -> InventoryResult<Vec<StockRow>> {
        let rows = self
            .gateway
            .fetch(
                "SELECT i.sucursal_id, i.producto_id, p.nombre AS nombre_producto, \
                        i.stock_actual, i.stock_minimo, i.updated_at \
                   FROM inventario_sucursal i \
                   JOIN productos p ON p.id = i.producto_id \
                  WHERE i.sucursal_id = $1 AND i.stock_actual <= i.stock_minimo \
                  ORDER BY i.stock_actual ASC",
                &[sucursal_id.into()],
            )
            .await?;
        rows.into_iter().map(|r| stock_row(&r)).collect()
    }

    /// One product's stock across every branch that holds it.
    pub async fn get_stock_global(
        &self,
        producto_id: i64,
    ) -> InventoryResult<Vec<StockPorSucursal>> {
        let rows = self
            .gateway
            .fetch(
                "SELECT i.sucursal_id, s.nombre AS nombre_sucursal, i.stock_actual \
                   FROM inventario_sucursal i \
                   JOIN sucursales s ON s.id = i.sucursal_id \
                  WHERE i.producto_id = $1 \
                  ORDER BY s.nombre",
                &[producto_id.into()],
            )
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(StockPorSucursal {
                    sucursal_id: r.get_i64("sucursal_id")?,
                    nombre_sucursal: r.get_str("nombre_sucursal")?.to_string(),
                    stock_actual: r.get_i64("stock_actual")?,
                })
            })
            .collect()
    }

    /// Every product's stock summed across all branches, scarcest
    /// first.
    pub async fn get_stock_consolidado(&self) -> InventoryResult<Vec<StockConsolidado>> {
        let rows = self
            .gateway
            .fetch(
                "SELECT p.id AS producto_id, p.nombre AS nombre_producto, \
                        CAST(COALESCE(SUM(i.stock_actual), 0) AS BIGINT) AS stock_total \
                   FROM productos p \
                   LEFT JOIN inventario_sucursal i ON i.producto_id = p.id \
                  GROUP BY p.id, p.nombre \
                  ORDER BY stock_total ASC",
                &[],
            )
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(StockConsolidado {
                    producto_id: r.get_i64("producto_id")?,
                    nombre_producto: r.get_str("nombre_producto")?.to_string(),
                    stock_total: r.get_i64("stock_total")?,
                })
            })
            .collect()
    }

    /// Recent movement history for one branch/product, newest first.
    pub async fn get_movimientos(
        &self,
        sucursal_id: i64,
        producto_id: i64,
        limit: i64,
    ) -> InventoryResult<Vec<MovimientoRow>> {
        let rows = self
            .gateway
            .fetch(
                "SELECT id, sucursal_id, producto_id, tipo_movimiento, cantidad, \
                        stock_anterior, stock_nuevo, referencia_id, empleado_id, created_at \
                   FROM movimientos_inventario \
                  WHERE sucursal_id = $1 AND producto_id = $2 \
                  ORDER BY id DESC \
                  LIMIT $3",
                &[sucursal_id.into(), producto_id.into(), limit.into()],
            )
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(MovimientoRow {
                    id: r.get_i64("id")?,
                    sucursal_id: r.get_i64("sucursal_id")?,
                    producto_id: r.get_i64("producto_id")?,
                    tipo_movimiento: r.get_str("tipo_movimiento")?.to_string(),
                    cantidad: r.get_i64("cantidad")?,
                    stock_anterior: r.get_i64("stock_anterior")?,
                    stock_nuevo: r.get_i64("stock_nuevo")?,
                    referencia_id: r.get_opt_str("referencia_id")?.map(str::to_string),
                    empleado_id: r.get_opt_i64("empleado_id")?,
                    created_at: r.get_datetime("created_at")?,
                })
            })
            .collect()
    }
}

fn stock_row(r: &abasto_db::SqlRow) -> InventoryResult<StockRow> {
    Ok(StockRow {
        sucursal_id: r.get_i64("sucursal_id")?,
        producto_id: r.get_i64("producto_id")?,
        nombre_producto: r.get_str("nombre_producto")?.to_string(),
        stock_actual: r.get_i64("stock_actual")?,
        stock_minimo: r.get_i64("stock_minimo")?,
        updated_at: r.get_datetime("updated_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InventoryError;
    use abasto_db::{Gateway, GatewayConfig};

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
        gateway
            .execute(
                "INSERT INTO productos (nombre, precio_venta, updated_at) VALUES ($1, $2, $3)",
                &["Cafe 500g".into(), 120.0.into(), now.into()],
            )
            .await
            .unwrap();
        gateway
            .execute(
                "INSERT INTO inventario_sucursal \
                 (sucursal_id, producto_id, stock_actual, stock_minimo, updated_at) \
                 VALUES (1, 1, 50, 5, $1)",
                &[now.into()],
            )
            .await
            .unwrap();
        gateway
    }

    async fn movement_count(gateway: &Gateway) -> i64 {
        gateway
            .fetch_one("SELECT COUNT(*) AS n FROM movimientos_inventario", &[])
            .await
            .unwrap()
            .get_i64("n")
            .unwrap()
    }

    #[tokio::test]
    async fn debit_writes_balance_and_movement_together() {
        let gateway = seeded_gateway().await;
        let (anterior, nuevo) = gateway
            .transaction(|client| {
                Box::pin(async move {
                    debit_stock(
                        client,
                        1,
                        1,
                        10,
                        MovementKind::Salida,
                        MovementContext::default(),
                    )
                    .await
                })
            })
            .await
            .unwrap();
        assert_eq!((anterior, nuevo), (50, 40));

        let inv = Inventory::new(gateway.clone());
        assert_eq!(inv.get_stock(1, 1).await.unwrap(), Some(40));
        assert_eq!(movement_count(&gateway).await, 1);

        let movs = inv.get_movimientos(1, 1, 10).await.unwrap();
        assert_eq!(movs[0].tipo_movimiento, "salida");
        assert_eq!(movs[0].stock_anterior, 50);
        assert_eq!(movs[0].stock_nuevo, 40);
    }

    #[tokio::test]
    async fn debit_below_balance_is_refused_with_available_amount() {
        let gateway = seeded_gateway().await;
        let err = gateway
            .transaction(|client| {
                Box::pin(async move {
                    debit_stock(
                        client,
                        1,
                        1,
                        51,
                        MovementKind::Salida,
                        MovementContext::default(),
                    )
                    .await
                })
            })
            .await
            .unwrap_err();
        match err {
            InventoryError::Domain(DomainError::InsufficientStock {
                solicitado,
                disponible,
                ..
            }) => {
                assert_eq!(solicitado, 51);
                assert_eq!(disponible, 50);
            }
            other => panic!("unexpected error: {other}"),
        }
        // refused debit leaves no movement row
        assert_eq!(movement_count(&gateway).await, 0);
        let inv = Inventory::new(gateway);
        assert_eq!(inv.get_stock(1, 1).await.unwrap(), Some(50));
    }

    #[tokio::test]
    async fn debit_without_inventory_row_is_a_distinct_error() {
        let gateway = seeded_gateway().await;
        let err = gateway
            .transaction(|client| {
                Box::pin(async move {
                    debit_stock(
                        client,
                        1,
                        99,
                        1,
                        MovementKind::Salida,
                        MovementContext::default(),
                    )
                    .await
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Domain(DomainError::MissingInventoryRecord { .. })
        ));
    }

    #[tokio::test]
    async fn credit_upserts_missing_row() {
        let gateway = seeded_gateway().await;
        // producto 2 never stocked at sucursal 1
        gateway
            .execute(
                "INSERT INTO productos (nombre, precio_venta, updated_at) VALUES ($1, $2, $3)",
                &["Te verde".into(), 80.0.into(), Utc::now().into()],
            )
            .await
            .unwrap();

        let (anterior, nuevo) = gateway
            .transaction(|client| {
                Box::pin(async move {
                    credit_stock(
                        client,
                        1,
                        2,
                        7,
                        MovementKind::TransferenciaEntrada,
                        MovementContext {
                            referencia_id: Some("3"),
                            ..Default::default()
                        },
                    )
                    .await
                })
            })
            .await
            .unwrap();
        assert_eq!((anterior, nuevo), (0, 7));

        let inv = Inventory::new(gateway);
        assert_eq!(inv.get_stock(1, 2).await.unwrap(), Some(7));
        let movs = inv.get_movimientos(1, 2, 10).await.unwrap();
        assert_eq!(movs[0].referencia_id.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected_up_front() {
        let gateway = seeded_gateway().await;
        let err = gateway
            .transaction(|client| {
                Box::pin(async move {
                    credit_stock(
                        client,
                        1,
                        1,
                        0,
                        MovementKind::Entrada,
                        MovementContext::default(),
                    )
                    .await
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Domain(DomainError::NonPositiveQuantity(0))
        ));
    }

    #[tokio::test]
    async fn consolidated_stock_sums_across_branches_scarcest_first() {
        let gateway = seeded_gateway().await;
        let now = Utc::now();
        gateway
            .execute(
                "INSERT INTO sucursales (nombre, created_at) VALUES ($1, $2)",
                &["Norte".into(), now.into()],
            )
            .await
            .unwrap();
        // same product stocked at a second branch
        gateway
            .execute(
                "INSERT INTO inventario_sucursal \
                 (sucursal_id, producto_id, stock_actual, stock_minimo, updated_at) \
                 VALUES (2, 1, 20, 0, $1)",
                &[now.into()],
            )
            .await
            .unwrap();
        // a product no branch has ever stocked
        gateway
            .execute(
                "INSERT INTO productos (nombre, precio_venta, updated_at) VALUES ($1, $2, $3)",
                &["Te verde".into(), 80.0.into(), now.into()],
            )
            .await
            .unwrap();

        let inv = Inventory::new(gateway);
        let consolidado = inv.get_stock_consolidado().await.unwrap();
        assert_eq!(consolidado.len(), 2);
        // scarcest first: the never-stocked product totals zero
        assert_eq!(consolidado[0].nombre_producto, "Te verde");
        assert_eq!(consolidado[0].stock_total, 0);
        assert_eq!(consolidado[1].nombre_producto, "Cafe 500g");
        assert_eq!(consolidado[1].stock_total, 70);
    }

    #[tokio::test]
    async fn low_stock_projection_flags_at_or_below_minimum() {
        let gateway = seeded_gateway().await;
        gateway
            .execute(
                "UPDATE inventario_sucursal SET stock_actual = 5 WHERE sucursal_id = 1",
                &[],
            )
            .await
            .unwrap();
        let inv = Inventory::new(gateway);
        let low = inv.get_stock_bajo(1).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].nombre_producto, "Cafe 500g");
    }
}
