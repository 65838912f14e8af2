//! Testing utilities and mock implementations for workflow tests.
//!
//! This module provides a mock of the registry session, allowing the three
//! stages to run end-to-end without the STIL portal.
//!
//! # Example
//!
//! ```rust,ignore
//! use dataaftaler_core::testing::{fixtures, MockRegistry};
//!
//! let registry = fixtures::three_institution_registry().await;
//! registry.push_transition_error("A3", RegistryError::Transient("HTTP 502".into())).await;
//! ```

mod mock_registry;

pub use mock_registry::{MockRegistry, RecordedRegistryCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use super::MockRegistry;
    use crate::registry::{Agreement, AgreementStatus, Institution, InstitutionKind};

    /// Create an organisation.
    pub fn institution(id: &str, name: &str, kind: InstitutionKind) -> Institution {
        Institution {
            id: id.to_string(),
            name: name.to_string(),
            kind,
        }
    }

    /// Create an agreement held by `institution`.
    pub fn agreement(institution: &Institution, agreement_id: &str, status: AgreementStatus) -> Agreement {
        Agreement {
            institution: institution.reference(),
            institution_name: institution.name.clone(),
            agreement_id: agreement_id.to_string(),
            system_name: "Aula".to_string(),
            service_name: "Elevdata".to_string(),
            current_status: status,
        }
    }

    /// Three organisations holding A1 (approved), A2 (pending) and A3 (approved).
    pub async fn three_institution_registry() -> MockRegistry {
        let registry = MockRegistry::new();

        let school = institution("751001", "Aarhus Skole", InstitutionKind::Institution);
        let gymnasium = institution("751002", "Aarhus Gymnasium", InstitutionKind::Institution);
        let daycare = institution("D1003", "Børnehuset Solsikken", InstitutionKind::Daycare);

        registry
            .add_agreement(agreement(&school, "A1", AgreementStatus::Approved))
            .await;
        registry
            .add_agreement(agreement(&gymnasium, "A2", AgreementStatus::Pending))
            .await;
        registry
            .add_agreement(agreement(&daycare, "A3", AgreementStatus::Approved))
            .await;

        registry.add_institution(school).await;
        registry.add_institution(gymnasium).await;
        registry.add_institution(daycare).await;

        registry
    }
}
