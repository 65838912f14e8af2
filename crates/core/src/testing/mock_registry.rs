//! Mock registry session for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::registry::{
    Agreement, AgreementStatus, Institution, InstitutionRef, RateLimiter, RegistryError,
    RegistrySession, TargetStatus,
};

/// A recorded registry call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedRegistryCall {
    ListInstitutions,
    ListAgreements {
        institution: InstitutionRef,
    },
    ApplyTransition {
        institution: InstitutionRef,
        agreement_id: String,
        target: TargetStatus,
    },
}

/// Mock implementation of the RegistrySession trait.
///
/// Behaves like the portal for the parts the robot uses:
/// - Selecting an organisation and acting on it costs two registry calls
/// - Unknown organisations and agreements are `NotFound`
/// - Deleted agreements reject every further transition
///
/// Errors can be queued globally or per institution / agreement.
#[derive(Debug, Default)]
pub struct MockRegistry {
    institutions: Arc<RwLock<Vec<Institution>>>,
    agreements: Arc<RwLock<Vec<Agreement>>>,
    calls: Arc<RwLock<Vec<RecordedRegistryCall>>>,
    /// Consumed by whichever operation runs next.
    next_errors: Arc<RwLock<VecDeque<RegistryError>>>,
    institution_errors: Arc<RwLock<HashMap<InstitutionRef, VecDeque<RegistryError>>>>,
    transition_errors: Arc<RwLock<HashMap<String, VecDeque<RegistryError>>>>,
    limiter: Option<Arc<RateLimiter>>,
}

impl MockRegistry {
    /// Create a new empty mock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count calls against `limiter`, pausing like the real client would.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    // =========================================================================
    // Registry Contents
    // =========================================================================

    pub async fn add_institution(&self, institution: Institution) {
        self.institutions.write().await.push(institution);
    }

    pub async fn add_agreement(&self, agreement: Agreement) {
        self.agreements.write().await.push(agreement);
    }

    /// Current state of an agreement, as the registry would report it.
    pub async fn agreement(&self, agreement_id: &str) -> Option<Agreement> {
        self.agreements
            .read()
            .await
            .iter()
            .find(|a| a.agreement_id == agreement_id)
            .cloned()
    }

    // =========================================================================
    // Call Recording
    // =========================================================================

    pub async fn recorded_calls(&self) -> Vec<RecordedRegistryCall> {
        self.calls.read().await.clone()
    }

    /// Transitions applied or attempted, in order.
    pub async fn recorded_transitions(&self) -> Vec<(String, TargetStatus)> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                RecordedRegistryCall::ApplyTransition {
                    agreement_id,
                    target,
                    ..
                } => Some((agreement_id.clone(), *target)),
                _ => None,
            })
            .collect()
    }

    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    // =========================================================================
    // Error Injection
    // =========================================================================

    /// Fail the next operation, whatever it is.
    pub async fn push_next_error(&self, error: RegistryError) {
        self.next_errors.write().await.push_back(error);
    }

    /// Fail the next agreement fetch for `institution`.
    pub async fn push_institution_error(&self, institution: InstitutionRef, error: RegistryError) {
        self.institution_errors
            .write()
            .await
            .entry(institution)
            .or_default()
            .push_back(error);
    }

    /// Fail the next transition of `agreement_id`.
    pub async fn push_transition_error(&self, agreement_id: &str, error: RegistryError) {
        self.transition_errors
            .write()
            .await
            .entry(agreement_id.to_string())
            .or_default()
            .push_back(error);
    }

    async fn take_error(&self) -> Option<RegistryError> {
        self.next_errors.write().await.pop_front()
    }

    async fn record(&self, call: RecordedRegistryCall, registry_calls: u32) {
        self.calls.write().await.push(call);
        if let Some(limiter) = &self.limiter {
            for _ in 0..registry_calls {
                limiter.record_call().await;
            }
        }
    }

    async fn knows_institution(&self, institution: &InstitutionRef) -> bool {
        self.institutions
            .read()
            .await
            .iter()
            .any(|i| &i.reference() == institution)
    }
}

#[async_trait]
impl RegistrySession for MockRegistry {
    async fn list_institutions(&self) -> Result<Vec<Institution>, RegistryError> {
        self.record(RecordedRegistryCall::ListInstitutions, 1).await;

        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        Ok(self.institutions.read().await.clone())
    }

    async fn list_agreements_for(
        &self,
        institution: &Institution,
    ) -> Result<Vec<Agreement>, RegistryError> {
        let reference = institution.reference();
        self.record(
            RecordedRegistryCall::ListAgreements {
                institution: reference.clone(),
            },
            2,
        )
        .await;

        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if let Some(err) = self
            .institution_errors
            .write()
            .await
            .get_mut(&reference)
            .and_then(|errors| errors.pop_front())
        {
            return Err(err);
        }
        if !self.knows_institution(&reference).await {
            return Err(RegistryError::NotFound(format!("organisation {}", reference)));
        }

        Ok(self
            .agreements
            .read()
            .await
            .iter()
            .filter(|a| a.institution == reference)
            .cloned()
            .collect())
    }

    async fn apply_status_transition(
        &self,
        institution: &InstitutionRef,
        agreement_id: &str,
        target: TargetStatus,
    ) -> Result<(), RegistryError> {
        self.record(
            RecordedRegistryCall::ApplyTransition {
                institution: institution.clone(),
                agreement_id: agreement_id.to_string(),
                target,
            },
            2,
        )
        .await;

        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if let Some(err) = self
            .transition_errors
            .write()
            .await
            .get_mut(agreement_id)
            .and_then(|errors| errors.pop_front())
        {
            return Err(err);
        }
        if !self.knows_institution(institution).await {
            return Err(RegistryError::NotFound(format!("organisation {}", institution)));
        }

        let mut agreements = self.agreements.write().await;
        let agreement = agreements
            .iter_mut()
            .find(|a| &a.institution == institution && a.agreement_id == agreement_id)
            .ok_or_else(|| {
                RegistryError::NotFound(format!("agreement {} of {}", agreement_id, institution))
            })?;

        if agreement.current_status == AgreementStatus::Deleted {
            return Err(RegistryError::Rejected {
                status: 409,
                message: format!("Aftale {} er slettet", agreement_id),
            });
        }

        agreement.current_status = target.resulting_status();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InstitutionKind;
    use crate::testing::fixtures;

    async fn registry_with_one_agreement() -> MockRegistry {
        let registry = MockRegistry::new();
        let school = fixtures::institution("751001", "Aarhus Skole", InstitutionKind::Institution);
        registry
            .add_agreement(fixtures::agreement(&school, "A1", AgreementStatus::Approved))
            .await;
        registry.add_institution(school).await;
        registry
    }

    #[tokio::test]
    async fn test_list_agreements() {
        let registry = registry_with_one_agreement().await;
        let institutions = registry.list_institutions().await.unwrap();

        let agreements = registry.list_agreements_for(&institutions[0]).await.unwrap();
        assert_eq!(agreements.len(), 1);
        assert_eq!(agreements[0].agreement_id, "A1");
    }

    #[tokio::test]
    async fn test_apply_transition_updates_status() {
        let registry = registry_with_one_agreement().await;
        let school = InstitutionRef::new(InstitutionKind::Institution, "751001");

        registry
            .apply_status_transition(&school, "A1", TargetStatus::Await)
            .await
            .unwrap();

        let agreement = registry.agreement("A1").await.unwrap();
        assert_eq!(agreement.current_status, AgreementStatus::Pending);
        assert_eq!(
            registry.recorded_transitions().await,
            vec![("A1".to_string(), TargetStatus::Await)]
        );
    }

    #[tokio::test]
    async fn test_deleted_agreement_rejects_transitions() {
        let registry = registry_with_one_agreement().await;
        let school = InstitutionRef::new(InstitutionKind::Institution, "751001");

        registry
            .apply_status_transition(&school, "A1", TargetStatus::Delete)
            .await
            .unwrap();
        let err = registry
            .apply_status_transition(&school, "A1", TargetStatus::Delete)
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::Rejected { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_unknown_agreement_is_not_found() {
        let registry = registry_with_one_agreement().await;
        let school = InstitutionRef::new(InstitutionKind::Institution, "751001");

        let err = registry
            .apply_status_transition(&school, "A9", TargetStatus::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_error_injection_is_consumed() {
        let registry = registry_with_one_agreement().await;
        registry
            .push_next_error(RegistryError::Transient("HTTP 503".to_string()))
            .await;

        assert!(registry.list_institutions().await.is_err());
        assert!(registry.list_institutions().await.is_ok());
    }

    #[tokio::test]
    async fn test_counts_two_calls_per_organisation_action() {
        let limiter = Arc::new(RateLimiter::unlimited());
        let registry = registry_with_one_agreement()
            .await
            .with_rate_limiter(Arc::clone(&limiter));
        let school = InstitutionRef::new(InstitutionKind::Institution, "751001");

        let institutions = registry.list_institutions().await.unwrap();
        registry.list_agreements_for(&institutions[0]).await.unwrap();
        registry
            .apply_status_transition(&school, "A1", TargetStatus::Approve)
            .await
            .unwrap();

        assert_eq!(limiter.calls_made(), 5);
    }
}
