//! The canonical sales pipeline.
//!
//! Eight ordered stages, four checklist items each. The shared instance is
//! read-only; negotiations receive deep copies through [`default_stages`].

use once_cell::sync::Lazy;

use crate::{
    error::{CrmError, CrmResult},
    model::{Stage, SubStage},
};

/// Display label for stage ids missing from the catalog.
pub const UNKNOWN_STAGE_NAME: &str = "Etapa Desconocida";

struct StageTemplate {
    id: &'static str,
    name: &'static str,
    color: &'static str,
    icon: &'static str,
    description: &'static str,
    /// (name, description)
    checklist: [(&'static str, &'static str); 4],
}

const PIPELINE: [StageTemplate; 8] = [
    StageTemplate {
        id: "contact",
        name: "Contacto",
        color: "#6c757d",
        icon: "person",
        description: "Primer contacto con el cliente",
        checklist: [
            ("Identificar prospecto", "Identificar y validar el prospecto"),
            ("Primer contacto", "Realizar primer contacto telefónico o email"),
            ("Agendar reunión", "Programar reunión inicial"),
            ("Reunión inicial", "Realizar reunión de descubrimiento"),
        ],
    },
    StageTemplate {
        id: "proposal",
        name: "Propuesta Enviada",
        color: "#007bff",
        icon: "document-text",
        description: "Propuesta comercial enviada",
        checklist: [
            ("Análisis de necesidades", "Analizar requerimientos del cliente"),
            ("Elaborar propuesta", "Crear propuesta comercial personalizada"),
            ("Revisar propuesta", "Revisar y aprobar propuesta internamente"),
            ("Enviar propuesta", "Enviar propuesta al cliente"),
        ],
    },
    StageTemplate {
        id: "negotiation",
        name: "Negociación",
        color: "#ffc107",
        icon: "chatbubbles",
        description: "En proceso de negociación",
        checklist: [
            ("Presentar propuesta", "Presentar propuesta al cliente"),
            ("Recibir feedback", "Recibir comentarios y ajustes del cliente"),
            ("Ajustar propuesta", "Realizar ajustes según feedback"),
            ("Negociar términos", "Negociar precio, plazos y condiciones"),
        ],
    },
    StageTemplate {
        id: "closing",
        name: "Cierre",
        color: "#90EE90",
        icon: "checkmark-circle",
        description: "Negociación cerrada",
        checklist: [
            ("Acuerdo final", "Llegar a acuerdo final con el cliente"),
            ("Preparar contrato", "Elaborar contrato o acuerdo"),
            ("Firmar contrato", "Firmar contrato con el cliente"),
            ("Confirmar cierre", "Confirmar cierre de la negociación"),
        ],
    },
    StageTemplate {
        id: "implementation_invoice",
        name: "Factura Implementación",
        color: "#17a2b8",
        icon: "card",
        description: "Factura de implementación enviada",
        checklist: [
            ("Generar factura", "Crear factura de implementación"),
            ("Revisar factura", "Revisar detalles de la factura"),
            ("Enviar factura", "Enviar factura al cliente"),
            ("Confirmar recepción", "Confirmar recepción de la factura"),
        ],
    },
    StageTemplate {
        id: "implementation_started",
        name: "Implementación Iniciada",
        color: "#fd7e14",
        icon: "play-circle",
        description: "Implementación en curso",
        checklist: [
            ("Planificar implementación", "Crear plan de implementación"),
            ("Asignar equipo", "Asignar recursos para implementación"),
            ("Iniciar implementación", "Comenzar proceso de implementación"),
            ("Seguimiento inicial", "Realizar seguimiento inicial del progreso"),
        ],
    },
    StageTemplate {
        id: "implementation_completed",
        name: "Implementación Finalizada",
        color: "#98FB98",
        icon: "checkmark-done-circle",
        description: "Implementación completada",
        checklist: [
            ("Finalizar implementación", "Completar proceso de implementación"),
            ("Pruebas finales", "Realizar pruebas de funcionamiento"),
            ("Entrenamiento cliente", "Capacitar al cliente en el uso"),
            ("Entrega final", "Entregar proyecto al cliente"),
        ],
    },
    StageTemplate {
        id: "post_implementation",
        name: "Seguimiento Post-Implementación",
        color: "#6f42c1",
        icon: "trending-up",
        description: "Seguimiento y soporte continuo",
        checklist: [
            ("Seguimiento inicial", "Realizar seguimiento inicial post-entrega"),
            ("Soporte técnico", "Brindar soporte técnico al cliente"),
            ("Recopilar feedback", "Recopilar feedback del cliente"),
            ("Planificar mejoras", "Planificar mejoras basadas en feedback"),
        ],
    },
];

impl StageTemplate {
    fn build(&self, order: u32) -> Stage {
        let sub_stages = self
            .checklist
            .iter()
            .zip(1_u32..)
            .map(|((name, description), position)| SubStage {
                id: format!("{}_{}", self.id, position),
                name: (*name).to_string(),
                description: (*description).to_string(),
                completed: false,
                completed_date: None,
                notes: String::new(),
                order: position,
            })
            .collect();
        Stage {
            id: self.id.to_string(),
            name: self.name.to_string(),
            order,
            color: self.color.to_string(),
            icon: self.icon.to_string(),
            description: self.description.to_string(),
            sub_stages,
            notes: None,
        }
    }
}

static CATALOG: Lazy<Vec<Stage>> = Lazy::new(|| {
    PIPELINE
        .iter()
        .zip(1_u32..)
        .map(|(template, order)| template.build(order))
        .collect()
});

/// The shared catalog, sorted by `order`.
pub fn catalog() -> &'static [Stage] {
    &CATALOG
}

/// Fresh, independently mutable copy of the catalog.
pub fn default_stages() -> Vec<Stage> {
    CATALOG.to_vec()
}

pub fn first_stage() -> &'static Stage {
    &CATALOG[0]
}

pub fn find_stage(stage_id: &str) -> Option<&'static Stage> {
    CATALOG.iter().find(|stage| stage.id == stage_id)
}

pub fn require_stage(stage_id: &str) -> CrmResult<&'static Stage> {
    find_stage(stage_id).ok_or_else(|| CrmError::UnknownStage(stage_id.to_string()))
}

/// Display name for `stage_id`, or [`UNKNOWN_STAGE_NAME`].
pub fn stage_name(stage_id: &str) -> &'static str {
    find_stage(stage_id)
        .map(|stage| stage.name.as_str())
        .unwrap_or(UNKNOWN_STAGE_NAME)
}
