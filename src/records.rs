//! The Record Store collaborator: durable storage for the doctor/patient
//! directory, with the uniqueness checks (CRM, CPF, email) the engine
//! delegates. Injected into the engine at construction so tests can run
//! against the in-memory implementation.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::{Doctor, Patient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A unique field (crm, cpf, email) is already taken by another record.
    DuplicateField(&'static str),
    NotFound(Ulid),
    /// Transient store failure (connection loss and the like).
    Unavailable(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::DuplicateField(field) => write!(f, "duplicate {field}"),
            RecordError::NotFound(id) => write!(f, "record not found: {id}"),
            RecordError::Unavailable(e) => write!(f, "record store unavailable: {e}"),
        }
    }
}

impl std::error::Error for RecordError {}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put_doctor(&self, doctor: Doctor) -> Result<(), RecordError>;
    async fn get_doctor(&self, id: Ulid) -> Result<Option<Doctor>, RecordError>;
    async fn delete_doctor(&self, id: Ulid) -> Result<(), RecordError>;
    async fn list_doctors(&self) -> Result<Vec<Doctor>, RecordError>;

    async fn put_patient(&self, patient: Patient) -> Result<(), RecordError>;
    async fn get_patient(&self, id: Ulid) -> Result<Option<Patient>, RecordError>;
    async fn delete_patient(&self, id: Ulid) -> Result<(), RecordError>;
    async fn list_patients(&self) -> Result<Vec<Patient>, RecordError>;
}

/// In-memory record store. Uniqueness is enforced through reverse indexes
/// keyed by the unique field value.
#[derive(Default)]
pub struct InMemoryRecords {
    doctors: DashMap<Ulid, Doctor>,
    patients: DashMap<Ulid, Patient>,
    by_crm: DashMap<String, Ulid>,
    by_cpf: DashMap<String, Ulid>,
    by_email: DashMap<String, Ulid>,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a unique value for `owner`. The entry API makes the
    /// check-and-insert atomic under concurrent puts. Returns true when
    /// the claim is new, false when `owner` already held the value.
    fn claim(
        index: &DashMap<String, Ulid>,
        key: &str,
        owner: Ulid,
        field: &'static str,
    ) -> Result<bool, RecordError> {
        match index.entry(key.to_string()) {
            Entry::Occupied(e) if *e.get() == owner => Ok(false),
            Entry::Occupied(_) => Err(RecordError::DuplicateField(field)),
            Entry::Vacant(v) => {
                v.insert(owner);
                Ok(true)
            }
        }
    }

    fn release(index: &DashMap<String, Ulid>, key: &str, owner: Ulid) {
        index.remove_if(key, |_, v| *v == owner);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecords {
    async fn put_doctor(&self, doctor: Doctor) -> Result<(), RecordError> {
        let crm_is_new = Self::claim(&self.by_crm, &doctor.crm, doctor.id, "crm")?;
        if let Err(e) = Self::claim(&self.by_email, &doctor.email, doctor.id, "email") {
            // A failed put must leave nothing claimed.
            if crm_is_new {
                Self::release(&self.by_crm, &doctor.crm, doctor.id);
            }
            return Err(e);
        }
        if let Some(old) = self.doctors.insert(doctor.id, doctor.clone()) {
            if old.crm != doctor.crm {
                Self::release(&self.by_crm, &old.crm, old.id);
            }
            if old.email != doctor.email {
                Self::release(&self.by_email, &old.email, old.id);
            }
        }
        Ok(())
    }

    async fn get_doctor(&self, id: Ulid) -> Result<Option<Doctor>, RecordError> {
        Ok(self.doctors.get(&id).map(|e| e.value().clone()))
    }

    async fn delete_doctor(&self, id: Ulid) -> Result<(), RecordError> {
        let (_, doctor) = self.doctors.remove(&id).ok_or(RecordError::NotFound(id))?;
        Self::release(&self.by_crm, &doctor.crm, id);
        Self::release(&self.by_email, &doctor.email, id);
        Ok(())
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, RecordError> {
        Ok(self.doctors.iter().map(|e| e.value().clone()).collect())
    }

    async fn put_patient(&self, patient: Patient) -> Result<(), RecordError> {
        let cpf_is_new = Self::claim(&self.by_cpf, &patient.cpf, patient.id, "cpf")?;
        if let Err(e) = Self::claim(&self.by_email, &patient.email, patient.id, "email") {
            if cpf_is_new {
                Self::release(&self.by_cpf, &patient.cpf, patient.id);
            }
            return Err(e);
        }
        if let Some(old) = self.patients.insert(patient.id, patient.clone()) {
            if old.cpf != patient.cpf {
                Self::release(&self.by_cpf, &old.cpf, old.id);
            }
            if old.email != patient.email {
                Self::release(&self.by_email, &old.email, old.id);
            }
        }
        Ok(())
    }

    async fn get_patient(&self, id: Ulid) -> Result<Option<Patient>, RecordError> {
        Ok(self.patients.get(&id).map(|e| e.value().clone()))
    }

    async fn delete_patient(&self, id: Ulid) -> Result<(), RecordError> {
        let (_, patient) = self.patients.remove(&id).ok_or(RecordError::NotFound(id))?;
        Self::release(&self.by_cpf, &patient.cpf, id);
        Self::release(&self.by_email, &patient.email, id);
        Ok(())
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, RecordError> {
        Ok(self.patients.iter().map(|e| e.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor(crm: &str, email: &str) -> Doctor {
        Doctor {
            id: Ulid::new(),
            name: "Dr. Souza".into(),
            specialty: "cardiology".into(),
            crm: crm.into(),
            email: email.into(),
        }
    }

    fn patient(cpf: &str, email: &str) -> Patient {
        Patient {
            id: Ulid::new(),
            name: "Ana Lima".into(),
            cpf: cpf.into(),
            email: email.into(),
        }
    }

    #[tokio::test]
    async fn doctor_crm_must_be_unique() {
        let store = InMemoryRecords::new();
        store.put_doctor(doctor("CRM-1", "a@clinic.test")).await.unwrap();

        let result = store.put_doctor(doctor("CRM-1", "b@clinic.test")).await;
        assert_eq!(result, Err(RecordError::DuplicateField("crm")));
    }

    #[tokio::test]
    async fn patient_cpf_must_be_unique() {
        let store = InMemoryRecords::new();
        store
            .put_patient(patient("111.222.333-44", "p1@mail.test"))
            .await
            .unwrap();

        let result = store.put_patient(patient("111.222.333-44", "p2@mail.test")).await;
        assert_eq!(result, Err(RecordError::DuplicateField("cpf")));
    }

    #[tokio::test]
    async fn updating_own_record_is_not_a_duplicate() {
        let store = InMemoryRecords::new();
        let mut doc = doctor("CRM-2", "c@clinic.test");
        store.put_doctor(doc.clone()).await.unwrap();

        doc.name = "Dr. Souza Filho".into();
        store.put_doctor(doc.clone()).await.unwrap();

        let fetched = store.get_doctor(doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Dr. Souza Filho");
    }

    #[tokio::test]
    async fn update_releases_old_unique_values() {
        let store = InMemoryRecords::new();
        let mut doc = doctor("CRM-3", "old@clinic.test");
        store.put_doctor(doc.clone()).await.unwrap();

        doc.email = "new@clinic.test".into();
        store.put_doctor(doc).await.unwrap();

        // The old email is free again.
        store
            .put_doctor(doctor("CRM-4", "old@clinic.test"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_releases_unique_values() {
        let store = InMemoryRecords::new();
        let doc = doctor("CRM-5", "e@clinic.test");
        let id = doc.id;
        store.put_doctor(doc).await.unwrap();
        store.delete_doctor(id).await.unwrap();

        assert!(store.get_doctor(id).await.unwrap().is_none());
        store.put_doctor(doctor("CRM-5", "e@clinic.test")).await.unwrap();
    }

    #[tokio::test]
    async fn failed_doctor_put_leaves_no_stale_claims() {
        let store = InMemoryRecords::new();
        store
            .put_doctor(doctor("CRM-A", "shared@clinic.test"))
            .await
            .unwrap();

        // Email collides, so nothing of this doctor may stay claimed.
        let result = store.put_doctor(doctor("CRM-B", "shared@clinic.test")).await;
        assert_eq!(result, Err(RecordError::DuplicateField("email")));

        // CRM-B was never stored and must still be registrable.
        store
            .put_doctor(doctor("CRM-B", "fresh@clinic.test"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_patient_put_leaves_no_stale_claims() {
        let store = InMemoryRecords::new();
        store
            .put_patient(patient("111.111.111-11", "shared@mail.test"))
            .await
            .unwrap();

        let result = store
            .put_patient(patient("222.222.222-22", "shared@mail.test"))
            .await;
        assert_eq!(result, Err(RecordError::DuplicateField("email")));

        store
            .put_patient(patient("222.222.222-22", "fresh@mail.test"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_update_keeps_existing_claims() {
        let store = InMemoryRecords::new();
        store
            .put_doctor(doctor("CRM-C", "c@clinic.test"))
            .await
            .unwrap();
        let mut doc = doctor("CRM-D", "d@clinic.test");
        store.put_doctor(doc.clone()).await.unwrap();

        // Update collides on email; the doctor's own crm claim must survive.
        doc.email = "c@clinic.test".into();
        let result = store.put_doctor(doc).await;
        assert_eq!(result, Err(RecordError::DuplicateField("email")));

        let taken = store.put_doctor(doctor("CRM-D", "other@clinic.test")).await;
        assert_eq!(taken, Err(RecordError::DuplicateField("crm")));
    }

    #[tokio::test]
    async fn delete_missing_record_fails() {
        let store = InMemoryRecords::new();
        let id = Ulid::new();
        assert_eq!(store.delete_patient(id).await, Err(RecordError::NotFound(id)));
    }
}
