//! # Inter-Branch Transfer Engine
//!
//! The transfer state machine over the stock ledger. Two initiation
//! modes share one lifecycle:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Transfer Operations                                 │
//! │                                                                         │
//! │  crear (envio)      origin debited now        → en_transito            │
//! │  crear (solicitud)  nothing moves yet         → solicitada             │
//! │  aprobar            origin debited now        solicitada → en_transito │
//! │  confirmar_recepcion  destination credited per line                    │
//! │                       all lines full  → completada                     │
//! │                       any line short  → recibida_parcial               │
//! │  cerrar             force-close a short-received transfer              │
//! │  cancelar           pendiente|solicitada only → cancelada              │
//! │                                                                         │
//! │  State changes are guarded UPDATEs (WHERE estado = …): a row count     │
//! │  of zero means someone else won the transition, and the transaction    │
//! │  rolls back. Terminal states never regress.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every stock movement carries the transfer id as `referencia_id`, so
//! the movement ledger reconstructs any transfer end to end.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use abasto_core::{DomainError, MovementKind, TransferKind, TransferState};
use abasto_db::{Gateway, GatewayClient, SqlRow, SqlValue};

use crate::error::InventoryResult;
use crate::ledger::{credit_stock, debit_stock, MovementContext};

// =============================================================================
// Types
// =============================================================================

/// One product line in a transfer request.
#[derive(Debug, Clone, Copy)]
pub struct TransferLine {
    pub producto_id: i64,
    pub cantidad: i64,
}

/// Input for creating a transfer.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub tipo: TransferKind,
    pub sucursal_origen_id: i64,
    pub sucursal_destino_id: i64,
    pub empleado_id: Option<i64>,
    pub observaciones: Option<String>,
    pub lineas: Vec<TransferLine>,
}

/// One received line in a receipt confirmation.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptLine {
    pub producto_id: i64,
    pub cantidad: i64,
}

/// A transfer header row.
#[derive(Debug, Clone, Serialize)]
pub struct Transferencia {
    pub id: i64,
    pub tipo: TransferKind,
    pub estado: TransferState,
    pub sucursal_origen_id: i64,
    pub sucursal_destino_id: i64,
    pub empleado_solicita_id: Option<i64>,
    pub empleado_envia_id: Option<i64>,
    pub empleado_recibe_id: Option<i64>,
    pub observaciones: Option<String>,
    pub fecha_creacion: DateTime<Utc>,
    pub fecha_envio: Option<DateTime<Utc>>,
    pub fecha_recepcion: Option<DateTime<Utc>>,
}

/// List projection: header plus branch names and line count.
#[derive(Debug, Clone, Serialize)]
pub struct TransferSummary {
    pub id: i64,
    pub tipo: TransferKind,
    pub estado: TransferState,
    pub sucursal_origen: String,
    pub sucursal_destino: String,
    pub total_productos: i64,
    pub fecha_creacion: DateTime<Utc>,
}

/// One detail line with its product name.
#[derive(Debug, Clone, Serialize)]
pub struct DetalleLine {
    pub producto_id: i64,
    pub nombre_producto: String,
    pub cantidad_solicitada: i64,
    pub cantidad_enviada: i64,
    pub cantidad_recibida: i64,
}

/// Full transfer view: header plus lines.
#[derive(Debug, Clone, Serialize)]
pub struct TransferDetail {
    #[serde(flatten)]
    pub transferencia: Transferencia,
    pub detalles: Vec<DetalleLine>,
}

// =============================================================================
// Engine
// =============================================================================

/// The transfer state machine.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    gateway: Gateway,
}

impl TransferEngine {
    pub fn new(gateway: Gateway) -> Self {
        TransferEngine { gateway }
    }

    /// Creates a transfer.
    ///
    /// A push (`envio`) debits origin stock immediately and starts in
    /// `en_transito`; a pull (`solicitud`) moves no stock and starts in
    /// `solicitada`. Creation is all-or-nothing: if any line lacks
    /// stock, nothing is written.
    pub async fn crear_transferencia(&self, new: NewTransfer) -> InventoryResult<Transferencia> {
        if new.lineas.is_empty() {
            return Err(DomainError::EmptyTransfer.into());
        }
        if new.sucursal_origen_id == new.sucursal_destino_id {
            return Err(DomainError::SameBranch(new.sucursal_origen_id).into());
        }
        for line in &new.lineas {
            if line.cantidad < 1 {
                return Err(DomainError::NonPositiveQuantity(line.cantidad).into());
            }
        }

        let transferencia = self
            .gateway
            .transaction(|client| {
                Box::pin(async move {
                    let now = Utc::now();
                    let estado = new.tipo.initial_state();
                    let is_push = new.tipo == TransferKind::Envio;

                    let (envia, solicita): (SqlValue, SqlValue) = if is_push {
                        (new.empleado_id.into(), None::<i64>.into())
                    } else {
                        (None::<i64>.into(), new.empleado_id.into())
                    };
                    let fecha_envio: SqlValue = if is_push {
                        Some(now).into()
                    } else {
                        None::<DateTime<Utc>>.into()
                    };

                    let row = client
                        .fetch_one(
                            "INSERT INTO transferencias_inventario \
                                (tipo, estado, sucursal_origen_id, sucursal_destino_id, \
                                 empleado_solicita_id, empleado_envia_id, observaciones, \
                                 fecha_creacion, fecha_envio) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                             RETURNING id",
                            &[
                                new.tipo.as_str().into(),
                                estado.as_str().into(),
                                new.sucursal_origen_id.into(),
                                new.sucursal_destino_id.into(),
                                solicita,
                                envia,
                                new.observaciones.clone().into(),
                                now.into(),
                                fecha_envio,
                            ],
                        )
                        .await?;
                    let id = row.get_i64("id")?;
                    let referencia = id.to_string();

                    for line in &new.lineas {
                        let enviada = if is_push { line.cantidad } else { 0 };
                        client
                            .execute(
                                "INSERT INTO transferencias_detalles \
                                    (transferencia_id, producto_id, cantidad_solicitada, \
                                     cantidad_enviada) \
                                 VALUES ($1, $2, $3, $4)",
                                &[
                                    id.into(),
                                    line.producto_id.into(),
                                    line.cantidad.into(),
                                    enviada.into(),
                                ],
                            )
                            .await?;

                        if is_push {
                            debit_stock(
                                client,
                                new.sucursal_origen_id,
                                line.producto_id,
                                line.cantidad,
                                MovementKind::TransferenciaSalida,
                                MovementContext {
                                    referencia_id: Some(&referencia),
                                    empleado_id: new.empleado_id,
                                    observaciones: None,
                                },
                            )
                            .await?;
                        }
                    }

                    load_header(client, id).await
                })
            })
            .await?;

        info!(
            id = transferencia.id,
            tipo = %transferencia.tipo,
            estado = %transferencia.estado,
            "transferencia creada"
        );
        Ok(transferencia)
    }

    /// Approves a pull request: debits origin stock and marks the
    /// transfer in transit.
    pub async fn aprobar_transferencia(
        &self,
        id: i64,
        empleado_id: Option<i64>,
    ) -> InventoryResult<Transferencia> {
        let transferencia = self
            .gateway
            .transaction(|client| {
                Box::pin(async move {
                    let now = Utc::now();
                    // Guarded transition; zero rows means wrong state
                    // (or missing transfer), and takes the row lock on
                    // postgres for the debits below.
                    let result = client
                        .execute(
                            "UPDATE transferencias_inventario \
                                SET estado = $2, fecha_envio = $3, empleado_envia_id = $4 \
                              WHERE id = $1 AND estado = $5",
                            &[
                                id.into(),
                                TransferState::EnTransito.as_str().into(),
                                now.into(),
                                empleado_id.into(),
                                TransferState::Solicitada.as_str().into(),
                            ],
                        )
                        .await?;
                    if result.rows_affected == 0 {
                        return Err(wrong_state(client, id, "aprobar").await);
                    }

                    let header = load_header(client, id).await?;
                    let referencia = id.to_string();

                    let lineas = client
                        .fetch(
                            "SELECT producto_id, cantidad_solicitada \
                               FROM transferencias_detalles \
                              WHERE transferencia_id = $1 \
                              ORDER BY id",
                            &[id.into()],
                        )
                        .await?;
                    for line in &lineas {
                        let producto_id = line.get_i64("producto_id")?;
                        let cantidad = line.get_i64("cantidad_solicitada")?;
                        debit_stock(
                            client,
                            header.sucursal_origen_id,
                            producto_id,
                            cantidad,
                            MovementKind::TransferenciaSalida,
                            MovementContext {
                                referencia_id: Some(&referencia),
                                empleado_id,
                                observaciones: None,
                            },
                        )
                        .await?;
                    }

                    client
                        .execute(
                            "UPDATE transferencias_detalles \
                                SET cantidad_enviada = cantidad_solicitada \
                              WHERE transferencia_id = $1",
                            &[id.into()],
                        )
                        .await?;

                    load_header(client, id).await
                })
            })
            .await?;

        info!(id, "transferencia aprobada, stock en transito");
        Ok(transferencia)
    }

    /// Confirms receipt of some or all lines at the destination.
    ///
    /// Credits destination stock per received line. Leaves the transfer
    /// `recibida_parcial` while any line is short; a later call can
    /// receive the remainder. Receiving more than was sent is refused.
    pub async fn confirmar_recepcion(
        &self,
        id: i64,
        recepciones: Vec<ReceiptLine>,
        empleado_id: Option<i64>,
    ) -> InventoryResult<Transferencia> {
        if recepciones.is_empty() {
            return Err(DomainError::EmptyTransfer.into());
        }
        for r in &recepciones {
            if r.cantidad < 1 {
                return Err(DomainError::NonPositiveQuantity(r.cantidad).into());
            }
        }

        let transferencia = self
            .gateway
            .transaction(|client| {
                Box::pin(async move {
                    let header = load_header(client, id).await?;
                    if !header.estado.accepts_receipt() {
                        return Err(DomainError::InvalidTransferState {
                            id,
                            estado: header.estado.as_str().to_string(),
                            accion: "confirmar_recepcion",
                        }
                        .into());
                    }

                    let now = Utc::now();
                    let referencia = id.to_string();

                    for r in recepciones {
                        let detalle = client
                            .fetch_optional(
                                "SELECT cantidad_enviada, cantidad_recibida \
                                   FROM transferencias_detalles \
                                  WHERE transferencia_id = $1 AND producto_id = $2",
                                &[id.into(), r.producto_id.into()],
                            )
                            .await?;
                        let detalle = match detalle {
                            Some(d) => d,
                            None => {
                                return Err(DomainError::LineNotInTransfer {
                                    transfer_id: id,
                                    producto_id: r.producto_id,
                                }
                                .into())
                            }
                        };
                        let enviada = detalle.get_i64("cantidad_enviada")?;
                        let recibida = detalle.get_i64("cantidad_recibida")?;
                        if recibida + r.cantidad > enviada {
                            return Err(DomainError::ReceiptExceedsSent {
                                transfer_id: id,
                                producto_id: r.producto_id,
                                enviada,
                                recibida: recibida + r.cantidad,
                            }
                            .into());
                        }

                        client
                            .execute(
                                "UPDATE transferencias_detalles \
                                    SET cantidad_recibida = cantidad_recibida + $3 \
                                  WHERE transferencia_id = $1 AND producto_id = $2",
                                &[id.into(), r.producto_id.into(), r.cantidad.into()],
                            )
                            .await?;

                        credit_stock(
                            client,
                            header.sucursal_destino_id,
                            r.producto_id,
                            r.cantidad,
                            MovementKind::TransferenciaEntrada,
                            MovementContext {
                                referencia_id: Some(&referencia),
                                empleado_id,
                                observaciones: None,
                            },
                        )
                        .await?;
                    }

                    let short = client
                        .fetch_one(
                            "SELECT COUNT(*) AS n FROM transferencias_detalles \
                              WHERE transferencia_id = $1 \
                                AND cantidad_recibida < cantidad_enviada",
                            &[id.into()],
                        )
                        .await?
                        .get_i64("n")?;
                    let nuevo_estado = if short == 0 {
                        TransferState::Completada
                    } else {
                        TransferState::RecibidaParcial
                    };

                    let result = client
                        .execute(
                            "UPDATE transferencias_inventario \
                                SET estado = $2, fecha_recepcion = $3, empleado_recibe_id = $4 \
                              WHERE id = $1 AND estado IN ($5, $6)",
                            &[
                                id.into(),
                                nuevo_estado.as_str().into(),
                                now.into(),
                                empleado_id.into(),
                                TransferState::EnTransito.as_str().into(),
                                TransferState::RecibidaParcial.as_str().into(),
                            ],
                        )
                        .await?;
                    if result.rows_affected == 0 {
                        // someone else completed or cancelled meanwhile
                        return Err(wrong_state(client, id, "confirmar_recepcion").await);
                    }

                    load_header(client, id).await
                })
            })
            .await?;

        info!(
            id,
            estado = %transferencia.estado,
            "recepcion confirmada"
        );
        Ok(transferencia)
    }

    /// Force-closes a short-received transfer to `completada`.
    ///
    /// No stock moves: the unreceived units were already debited at
    /// origin and the caller is accepting the loss.
    pub async fn cerrar_transferencia(
        &self,
        id: i64,
        empleado_id: Option<i64>,
    ) -> InventoryResult<Transferencia> {
        let transferencia = self
            .gateway
            .transaction(|client| {
                Box::pin(async move {
                    let result = client
                        .execute(
                            "UPDATE transferencias_inventario \
                                SET estado = $2, empleado_recibe_id = $3 \
                              WHERE id = $1 AND estado = $4",
                            &[
                                id.into(),
                                TransferState::Completada.as_str().into(),
                                empleado_id.into(),
                                TransferState::RecibidaParcial.as_str().into(),
                            ],
                        )
                        .await?;
                    if result.rows_affected == 0 {
                        return Err(wrong_state(client, id, "cerrar").await);
                    }
                    load_header(client, id).await
                })
            })
            .await?;

        info!(id, "transferencia cerrada con faltante");
        Ok(transferencia)
    }

    /// Cancels a transfer whose stock has not yet left the origin.
    ///
    /// Only `pendiente` and `solicitada` cancel; once a transfer is in
    /// transit the stock is already debited and must be received.
    pub async fn cancelar_transferencia(&self, id: i64) -> InventoryResult<Transferencia> {
        let transferencia = self
            .gateway
            .transaction(|client| {
                Box::pin(async move {
                    let result = client
                        .execute(
                            "UPDATE transferencias_inventario \
                                SET estado = $2 \
                              WHERE id = $1 AND estado IN ($3, $4)",
                            &[
                                id.into(),
                                TransferState::Cancelada.as_str().into(),
                                TransferState::Pendiente.as_str().into(),
                                TransferState::Solicitada.as_str().into(),
                            ],
                        )
                        .await?;
                    if result.rows_affected == 0 {
                        return Err(wrong_state(client, id, "cancelar").await);
                    }
                    load_header(client, id).await
                })
            })
            .await?;

        info!(id, "transferencia cancelada");
        Ok(transferencia)
    }

    /// Lists transfers, optionally filtered by branch (either side)
    /// and/or state. Newest first.
    pub async fn get_transferencias(
        &self,
        sucursal_id: Option<i64>,
        estado: Option<TransferState>,
    ) -> InventoryResult<Vec<TransferSummary>> {
        let estado_str: Option<String> = estado.map(|e| e.as_str().to_string());
        let rows = self
            .gateway
            .fetch(
                "SELECT t.id, t.tipo, t.estado, t.fecha_creacion, \
                        so.nombre AS sucursal_origen, sd.nombre AS sucursal_destino, \
                        (SELECT COUNT(*) FROM transferencias_detalles d \
                          WHERE d.transferencia_id = t.id) AS total_productos \
                   FROM transferencias_inventario t \
                   JOIN sucursales so ON so.id = t.sucursal_origen_id \
                   JOIN sucursales sd ON sd.id = t.sucursal_destino_id \
                  WHERE ($1 IS NULL OR t.sucursal_origen_id = $1 \
                                    OR t.sucursal_destino_id = $1) \
                    AND ($2 IS NULL OR t.estado = $2) \
                  ORDER BY t.id DESC",
                &[sucursal_id.into(), estado_str.into()],
            )
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(TransferSummary {
                    id: r.get_i64("id")?,
                    tipo: TransferKind::parse(r.get_str("tipo")?)?,
                    estado: TransferState::parse(r.get_str("estado")?)?,
                    sucursal_origen: r.get_str("sucursal_origen")?.to_string(),
                    sucursal_destino: r.get_str("sucursal_destino")?.to_string(),
                    total_productos: r.get_i64("total_productos")?,
                    fecha_creacion: r.get_datetime("fecha_creacion")?,
                })
            })
            .collect()
    }

    /// Loads one transfer with its lines and product names.
    pub async fn get_transferencia(&self, id: i64) -> InventoryResult<TransferDetail> {
        let row = self
            .gateway
            .fetch_optional(
                "SELECT id, tipo, estado, sucursal_origen_id, sucursal_destino_id, \
                        empleado_solicita_id, empleado_envia_id, empleado_recibe_id, \
                        observaciones, fecha_creacion, fecha_envio, fecha_recepcion \
                   FROM transferencias_inventario WHERE id = $1",
                &[id.into()],
            )
            .await?;
        let transferencia = match row {
            Some(r) => header_from_row(&r)?,
            None => return Err(DomainError::TransferNotFound(id).into()),
        };

        let detalles = self
            .gateway
            .fetch(
                "SELECT d.producto_id, p.nombre AS nombre_producto, \
                        d.cantidad_solicitada, d.cantidad_enviada, d.cantidad_recibida \
                   FROM transferencias_detalles d \
                   JOIN productos p ON p.id = d.producto_id \
                  WHERE d.transferencia_id = $1 \
                  ORDER BY d.id",
                &[id.into()],
            )
            .await?
            .into_iter()
            .map(|r| {
                Ok(DetalleLine {
                    producto_id: r.get_i64("producto_id")?,
                    nombre_producto: r.get_str("nombre_producto")?.to_string(),
                    cantidad_solicitada: r.get_i64("cantidad_solicitada")?,
                    cantidad_enviada: r.get_i64("cantidad_enviada")?,
                    cantidad_recibida: r.get_i64("cantidad_recibida")?,
                })
            })
            .collect::<InventoryResult<Vec<_>>>()?;

        Ok(TransferDetail {
            transferencia,
            detalles,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_header(client: &mut GatewayClient, id: i64) -> InventoryResult<Transferencia> {
    let row = client
        .fetch_optional(
            "SELECT id, tipo, estado, sucursal_origen_id, sucursal_destino_id, \
                    empleado_solicita_id, empleado_envia_id, empleado_recibe_id, \
                    observaciones, fecha_creacion, fecha_envio, fecha_recepcion \
               FROM transferencias_inventario WHERE id = $1",
            &[id.into()],
        )
        .await?;
    match row {
        Some(r) => header_from_row(&r),
        None => Err(DomainError::TransferNotFound(id).into()),
    }
}

fn header_from_row(r: &SqlRow) -> InventoryResult<Transferencia> {
    Ok(Transferencia {
        id: r.get_i64("id")?,
        tipo: TransferKind::parse(r.get_str("tipo")?)?,
        estado: TransferState::parse(r.get_str("estado")?)?,
        sucursal_origen_id: r.get_i64("sucursal_origen_id")?,
        sucursal_destino_id: r.get_i64("sucursal_destino_id")?,
        empleado_solicita_id: r.get_opt_i64("empleado_solicita_id")?,
        empleado_envia_id: r.get_opt_i64("empleado_envia_id")?,
        empleado_recibe_id: r.get_opt_i64("empleado_recibe_id")?,
        observaciones: r.get_opt_str("observaciones")?.map(str::to_string),
        fecha_creacion: r.get_datetime("fecha_creacion")?,
        fecha_envio: r.get_opt_datetime("fecha_envio")?,
        fecha_recepcion: r.get_opt_datetime("fecha_recepcion")?,
    })
}

/// Builds the right error for a refused guarded transition.
async fn wrong_state(
    client: &mut GatewayClient,
    id: i64,
    accion: &'static str,
) -> crate::InventoryError {
    let estado = client
        .fetch_optional(
            "SELECT estado FROM transferencias_inventario WHERE id = $1",
            &[id.into()],
        )
        .await;
    match estado {
        Ok(Some(row)) => match row.get_str("estado") {
            Ok(estado) => DomainError::InvalidTransferState {
                id,
                estado: estado.to_string(),
                accion,
            }
            .into(),
            Err(e) => e.into(),
        },
        Ok(None) => DomainError::TransferNotFound(id).into(),
        Err(e) => e.into(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
