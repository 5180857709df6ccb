//! # Sale Batch Wire Types
//!
//! The shapes that travel over the `sync_ventas` topic.
//!
//! ## Delivery Contract
//! ```text
//! branch node ──publish──► sync_ventas (durable, at-least-once) ──► consumer
//!
//! A batch may arrive MORE than once. The sale's caller-assigned `id`
//! is the idempotency key: a sale already present in the central store
//! is skipped, never re-applied.
//! ```
//!
//! Field names mirror the JSON the branch nodes already emit, so the
//! serde derives are the whole codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One batch of sales from one branch, as published to the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleBatchMessage {
    pub sucursal_id: i64,
    pub ventas: Vec<Venta>,
    pub timestamp: DateTime<Utc>,
}

/// A single sale as recorded at the branch point-of-sale.
///
/// `id` is assigned by the branch and doubles as the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venta {
    pub id: String,
    pub caja_id: i64,
    pub empleado_id: i64,
    pub cliente_id: Option<i64>,
    pub subtotal: f64,
    pub impuestos: f64,
    pub total: f64,
    pub estado: String,
    pub origen: String,
    pub fecha_venta: DateTime<Utc>,
    pub items: Vec<VentaItem>,
    pub pagos: Vec<VentaPago>,
}

/// Line item of a sale.
///
/// `nombre_producto` is a snapshot: the receipt keeps the name the
/// product had at sale time even if the catalog changes later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VentaItem {
    pub producto_id: i64,
    pub cantidad: i64,
    pub precio_unitario: f64,
    pub subtotal: f64,
    pub nombre_producto: String,
}

/// Payment entry of a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VentaPago {
    pub metodo: String,
    pub monto: f64,
    pub referencia: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_matches_branch_json() {
        let json = r#"{
            "sucursal_id": 3,
            "timestamp": "2026-08-01T10:00:00Z",
            "ventas": [{
                "id": "v-001",
                "caja_id": 1,
                "empleado_id": 7,
                "cliente_id": null,
                "subtotal": 100.0,
                "impuestos": 16.0,
                "total": 116.0,
                "estado": "completada",
                "origen": "pos",
                "fecha_venta": "2026-08-01T09:59:30Z",
                "items": [{
                    "producto_id": 42,
                    "cantidad": 2,
                    "precio_unitario": 50.0,
                    "subtotal": 100.0,
                    "nombre_producto": "Cafe molido 500g"
                }],
                "pagos": [{"metodo": "efectivo", "monto": 116.0, "referencia": null}]
            }]
        }"#;

        let msg: SaleBatchMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sucursal_id, 3);
        assert_eq!(msg.ventas.len(), 1);
        assert_eq!(msg.ventas[0].items[0].cantidad, 2);
        assert!(msg.ventas[0].cliente_id.is_none());

        // and back out without losing the field names the branches expect
        let round = serde_json::to_value(&msg).unwrap();
        assert_eq!(round["ventas"][0]["id"], "v-001");
        assert_eq!(round["ventas"][0]["pagos"][0]["metodo"], "efectivo");
    }
}
