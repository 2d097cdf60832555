use std::sync::{Arc, Mutex};

use crate::api::{ApiResult, Gateway};
use crate::flags::PendingSet;
use crate::models::{ProfileResponse, Subject};

/// Student-side enrollment state: the full subject collection with the
/// per-user `enrolled` flag, the student's profile, a busy marker per
/// subject with a toggle in flight, and a local filter.
#[derive(Clone)]
pub struct Enrollment {
    gateway: Arc<dyn Gateway>,
    state: Arc<Mutex<EnrollmentState>>,
    busy: PendingSet<i64>,
}

#[derive(Default)]
struct EnrollmentState {
    subjects: Vec<Subject>,
    profile: Option<ProfileResponse>,
    filter: FilterMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    All,
    EnrolledOnly,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ToggleOutcome {
    Enrolled,
    Unenrolled,
    /// A toggle for this subject is still in flight; nothing was submitted.
    Busy,
    UnknownSubject,
}

impl Enrollment {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            state: Arc::new(Mutex::new(EnrollmentState::default())),
            busy: PendingSet::new(),
        }
    }

    /// Fetches the subject collection and the profile concurrently; state is
    /// only replaced once both have landed. Either failure propagates to the
    /// caller untouched.
    pub async fn load_all(&self) -> ApiResult<()> {
        let (subjects, profile) =
            tokio::try_join!(self.gateway.subjects(), self.gateway.profile())?;
        let mut state = self.state.lock().unwrap();
        state.subjects = subjects;
        state.profile = Some(profile);
        Ok(())
    }

    pub fn profile(&self) -> Option<ProfileResponse> {
        self.state.lock().unwrap().profile.clone()
    }

    pub fn subjects(&self) -> Vec<Subject> {
        self.state.lock().unwrap().subjects.clone()
    }

    pub fn is_busy(&self, subject_id: i64) -> bool {
        self.busy.contains(&subject_id)
    }

    /// Enrolls or unenrolls based on the subject's current `enrolled` flag,
    /// then reloads the whole collection. The busy marker is held for the
    /// full round trip and clears on every exit path; a toggle for an
    /// already-busy subject submits nothing.
    pub async fn toggle(&self, subject_id: i64) -> ApiResult<ToggleOutcome> {
        let Some(_busy) = self.busy.try_begin(subject_id) else {
            return Ok(ToggleOutcome::Busy);
        };

        let enrolled = {
            let state = self.state.lock().unwrap();
            state
                .subjects
                .iter()
                .find(|s| s.id == subject_id)
                .map(|s| s.enrolled)
        };
        let Some(enrolled) = enrolled else {
            return Ok(ToggleOutcome::UnknownSubject);
        };

        if enrolled {
            self.gateway.unenroll(subject_id).await?;
        } else {
            self.gateway.enroll(subject_id).await?;
        }
        self.load_all().await?;

        Ok(if enrolled {
            ToggleOutcome::Unenrolled
        } else {
            ToggleOutcome::Enrolled
        })
    }

    pub fn set_filter(&self, filter: FilterMode) {
        self.state.lock().unwrap().filter = filter;
    }

    pub fn filter(&self) -> FilterMode {
        self.state.lock().unwrap().filter
    }

    /// Applies the local filter to the loaded collection. Pure; never
    /// touches the network.
    pub fn filtered(&self) -> Vec<Subject> {
        let state = self.state.lock().unwrap();
        match state.filter {
            FilterMode::All => state.subjects.clone(),
            FilterMode::EnrolledOnly => state
                .subjects
                .iter()
                .filter(|s| s.enrolled)
                .cloned()
                .collect(),
        }
    }

    pub fn enrolled_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .subjects
            .iter()
            .filter(|s| s.enrolled)
            .count()
    }
}
