use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use crate::attachment;
use crate::db::KvBackend;
use crate::error::{AttachmentError, Result};
use crate::models::{Attachment, JobRecord, SkillRecord};
use crate::store::{CollectionStore, InsertPolicy, Record};

pub const JOBS_ROOT: &str = "ats_jobs";
pub const SKILLS_ROOT: &str = "ats_skills";

/// Typed view of one collection. Accepts any well-shaped record; checking
/// required fields is up to the caller.
pub struct Repository<R> {
    store: CollectionStore,
    root: &'static str,
    policy: InsertPolicy,
    _record: PhantomData<fn() -> R>,
}

pub type JobRepository = Repository<JobRecord>;
pub type SkillRepository = Repository<SkillRecord>;

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            root: self.root,
            policy: self.policy,
            _record: PhantomData,
        }
    }
}

impl<R: Record> Repository<R> {
    pub fn new(store: CollectionStore, root: &'static str, policy: InsertPolicy) -> Self {
        Self {
            store,
            root,
            policy,
            _record: PhantomData,
        }
    }

    pub async fn init(&self) -> Result<()> {
        self.store.initialize(self.root).await
    }

    pub async fn list(&self) -> Result<Vec<R>> {
        self.store.list_all(self.root).await
    }

    pub async fn save(&self, record: R) -> Result<()> {
        self.store.upsert(self.root, record, self.policy).await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.store.remove_by_id::<R>(self.root, id).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<R>> {
        self.store.get_by_id(self.root, id).await
    }
}

impl JobRepository {
    /// Jobs, newest first.
    pub fn jobs(store: CollectionStore) -> Self {
        Self::new(store, JOBS_ROOT, InsertPolicy::Prepend)
    }
}

impl SkillRepository {
    /// Skills, in the order they were added.
    pub fn skills(store: CollectionStore) -> Self {
        Self::new(store, SKILLS_ROOT, InsertPolicy::Append)
    }
}

/// Entry point for front-ends: both collections plus attachment downloads.
#[derive(Clone)]
pub struct Tracker {
    jobs: JobRepository,
    skills: SkillRepository,
    download_dir: PathBuf,
}

impl Tracker {
    pub fn new(backend: Arc<dyn KvBackend>, download_dir: impl Into<PathBuf>) -> Self {
        let store = CollectionStore::new(backend);
        Self {
            jobs: JobRepository::jobs(store.clone()),
            skills: SkillRepository::skills(store),
            download_dir: download_dir.into(),
        }
    }

    pub async fn init_storage(&self) -> Result<()> {
        self.jobs.init().await?;
        self.skills.init().await
    }

    pub async fn get_jobs(&self) -> Result<Vec<JobRecord>> {
        self.jobs.list().await
    }

    pub async fn save_job(&self, job: JobRecord) -> Result<()> {
        self.jobs.save(job).await
    }

    pub async fn delete_job(&self, id: &str) -> Result<()> {
        self.jobs.remove(id).await
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>> {
        self.jobs.get_by_id(id).await
    }

    pub async fn get_skills(&self) -> Result<Vec<SkillRecord>> {
        self.skills.list().await
    }

    pub async fn save_skill(&self, skill: SkillRecord) -> Result<()> {
        self.skills.save(skill).await
    }

    pub async fn delete_skill(&self, id: &str) -> Result<()> {
        self.skills.remove(id).await
    }

    /// Write the attachment into the download directory. `Ok(None)` when
    /// there is nothing to download.
    pub async fn download_file(
        &self,
        attachment: Option<&Attachment>,
    ) -> std::result::Result<Option<PathBuf>, AttachmentError> {
        attachment::download_file(attachment, &self.download_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MemoryBackend};
    use crate::models::{JobStatus, SkillStatus, local_midnight};
    use chrono::NaiveDate;

    fn tracker() -> Tracker {
        Tracker::new(Arc::new(MemoryBackend::new()), std::env::temp_dir())
    }

    fn job(id: &str) -> JobRecord {
        let mut job = JobRecord::new("Engineer", "Acme");
        job.id = id.to_string();
        job
    }

    #[tokio::test]
    async fn test_get_jobs_before_any_save_is_empty() {
        let tracker = tracker();
        assert!(tracker.get_jobs().await.unwrap().is_empty());
        assert!(tracker.get_skills().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_storage_creates_both_roots() {
        let backend = Arc::new(MemoryBackend::new());
        let tracker = Tracker::new(backend.clone(), std::env::temp_dir());
        tracker.init_storage().await.unwrap();
        tracker.init_storage().await.unwrap();
        assert_eq!(backend.get(JOBS_ROOT).unwrap().as_deref(), Some(&b"[]"[..]));
        assert_eq!(backend.get(SKILLS_ROOT).unwrap().as_deref(), Some(&b"[]"[..]));
    }

    #[tokio::test]
    async fn test_save_twice_keeps_single_record() {
        let tracker = tracker();
        let j = job("1");
        tracker.save_job(j.clone()).await.unwrap();
        tracker.save_job(j.clone()).await.unwrap();
        let jobs = tracker.get_jobs().await.unwrap();
        assert_eq!(jobs, vec![j]);
    }

    #[tokio::test]
    async fn test_new_job_grows_list_by_one_newest_first() {
        let tracker = tracker();
        tracker.save_job(job("old")).await.unwrap();
        let before = tracker.get_jobs().await.unwrap().len();
        tracker.save_job(job("new")).await.unwrap();
        let jobs = tracker.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), before + 1);
        assert_eq!(jobs[0].id, "new");
        assert_eq!(jobs[1].id, "old");
    }

    #[tokio::test]
    async fn test_skills_append_in_order() {
        let tracker = tracker();
        let mut ids = Vec::new();
        for name in ["Rust", "SQL", "Kubernetes"] {
            let skill = SkillRecord::new(name);
            ids.push(skill.id.clone());
            tracker.save_skill(skill).await.unwrap();
        }
        let listed: Vec<String> = tracker
            .get_skills()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn test_skill_status_change_keeps_position() {
        let tracker = tracker();
        let first = SkillRecord::new("Rust");
        let second = SkillRecord::new("Go");
        tracker.save_skill(first.clone()).await.unwrap();
        tracker.save_skill(second.clone()).await.unwrap();

        let mut updated = first.clone();
        updated.status = SkillStatus::Learning;
        tracker.save_skill(updated).await.unwrap();

        let skills = tracker.get_skills().await.unwrap();
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0].id, first.id);
        assert_eq!(skills[0].status, SkillStatus::Learning);
        assert_eq!(skills[0].created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_delete_job_completeness() {
        let tracker = tracker();
        tracker.save_job(job("a")).await.unwrap();
        tracker.save_job(job("b")).await.unwrap();

        tracker.delete_job("a").await.unwrap();
        assert!(tracker.get_job("a").await.unwrap().is_none());
        assert_eq!(tracker.get_jobs().await.unwrap().len(), 1);

        tracker.delete_job("never-there").await.unwrap();
        assert_eq!(tracker.get_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_skill() {
        let tracker = tracker();
        let skill = SkillRecord::new("Rust");
        tracker.save_skill(skill.clone()).await.unwrap();
        tracker.delete_skill(&skill.id).await.unwrap();
        assert!(tracker.get_skills().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_saves_keep_both_jobs() {
        let backend = Arc::new(Database::open_in_memory().unwrap());
        let tracker = Tracker::new(backend, std::env::temp_dir());
        let (a, b) = tokio::join!(tracker.save_job(job("1")), tracker.save_job(job("2")));
        a.unwrap();
        b.unwrap();
        let mut ids: Vec<String> = tracker
            .get_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_damaged_attachment_does_not_hide_other_jobs() {
        let backend = Arc::new(MemoryBackend::new());
        let good = serde_json::to_value(job("good")).unwrap();
        let mut damaged = serde_json::to_value(job("damaged")).unwrap();
        damaged["cvFile"] = serde_json::json!({ "name": "cv.pdf", "data": {} });
        damaged["coverLetterFile"] = serde_json::json!({ "name": "cl.pdf", "data": "%%%" });
        let stored = serde_json::to_vec(&serde_json::json!([good, damaged])).unwrap();
        backend.set(JOBS_ROOT, &stored).unwrap();
        let tracker = Tracker::new(backend, std::env::temp_dir());

        let jobs = tracker.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), 2);

        let damaged = tracker.get_job("damaged").await.unwrap().unwrap();
        let cv = damaged.cv_file.clone().unwrap();
        assert_eq!(cv.name, "cv.pdf");
        assert!(cv.data.is_none());
        assert!(attachment::extract_downloadable(damaged.cv_file.as_ref()).is_none());
        assert!(tracker.download_file(damaged.cover_letter_file.as_ref()).await.unwrap().is_none());

        let mut edited = damaged;
        edited.status = JobStatus::Rejected;
        tracker.save_job(edited).await.unwrap();
        tracker.save_job(job("newer")).await.unwrap();
        let ids: Vec<String> = tracker
            .get_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec!["newer", "good", "damaged"]);
    }

    #[tokio::test]
    async fn test_missing_fields_are_stored_as_is() {
        let tracker = tracker();
        let blank = JobRecord::new("", "");
        tracker.save_job(blank.clone()).await.unwrap();
        assert_eq!(tracker.get_job(&blank.id).await.unwrap(), Some(blank));
    }

    #[tokio::test]
    async fn test_job_lifecycle_scenario() {
        let tracker = tracker();
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let mut j1 = job("j1").with_applied_date(date);
        j1.status = JobStatus::Applied;

        tracker.save_job(j1.clone()).await.unwrap();
        let jobs = tracker.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].created_at, local_midnight(date));

        j1.status = JobStatus::Accepted;
        tracker.save_job(j1.clone()).await.unwrap();
        let jobs = tracker.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Accepted);

        tracker.delete_job("j1").await.unwrap();
        assert!(tracker.get_jobs().await.unwrap().is_empty());
    }
}
