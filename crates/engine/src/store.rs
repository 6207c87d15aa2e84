use std::collections::{HashMap, HashSet, hash_map::Entry};

use buildwatch_core::models::{BuildResult, ParseError, ProjectInfo, ProjectStatus};
use buildwatch_jenkins::{FetchResult, LastBuild};
use time::UtcDateTime;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ApplyOutcome {
    /// The result was stale or its project is gone; nothing changed.
    Discarded,
    Applied { previous: BuildResult, current: BuildResult },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Only the settings changed, including whether the project counts toward the summary.
    SummaryFlagChanged,
    /// The connection settings changed and the status was replaced.
    Reconfigured,
}

/// Last known status of every project, keyed by project ID.
#[derive(Debug, Default)]
pub struct ProjectStatusStore {
    entries: HashMap<String, ProjectInfo>,
}

impl ProjectStatusStore {
    pub fn new() -> Self { Self::default() }

    /// Adds a project or refreshes its settings. The status held here is kept unless the
    /// connection settings changed, in which case the given status replaces it.
    pub fn upsert(&mut self, info: ProjectInfo) -> UpsertOutcome {
        match self.entries.entry(info.project.project_id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(info);
                UpsertOutcome::Inserted
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.project.connection_changed(&info.project) {
                    *existing = info;
                    UpsertOutcome::Reconfigured
                } else {
                    let flag_changed =
                        existing.project.ignore_for_summary != info.project.ignore_for_summary;
                    existing.project = info.project;
                    if flag_changed {
                        UpsertOutcome::SummaryFlagChanged
                    } else {
                        UpsertOutcome::Updated
                    }
                }
            }
        }
    }

    /// Marks every project not in `active` as deleted at `at`. Returns the IDs newly marked.
    pub fn retain_active(&mut self, active: &HashSet<String>, at: UtcDateTime) -> Vec<String> {
        let mut deleted = Vec::new();
        for (project_id, info) in &mut self.entries {
            if info.project.deletion_date.is_none() && !active.contains(project_id) {
                info.project.deletion_date = Some(at);
                deleted.push(project_id.clone());
            }
        }
        deleted
    }

    pub fn mark_deleted(&mut self, project_id: &str, at: UtcDateTime) -> bool {
        match self.entries.get_mut(project_id) {
            Some(info) if info.project.deletion_date.is_none() => {
                info.project.deletion_date = Some(at);
                true
            }
            _ => false,
        }
    }

    /// Forgets projects deleted at or before `cutoff`. Returns their IDs.
    pub fn purge(&mut self, cutoff: UtcDateTime) -> Vec<String> {
        let purged = self
            .entries
            .iter()
            .filter(|(_, info)| info.project.deletion_date.is_some_and(|date| date <= cutoff))
            .map(|(project_id, _)| project_id.clone())
            .collect::<Vec<_>>();
        for project_id in &purged {
            self.entries.remove(project_id);
        }
        purged
    }

    /// Records the result of a status request.
    ///
    /// Results whose request started no later than the last accepted one, and results for
    /// deleted projects, are discarded without touching anything.
    pub fn apply(&mut self, project_id: &str, result: &FetchResult) -> ApplyOutcome {
        let Some(info) = self.entries.get_mut(project_id) else {
            return ApplyOutcome::Discarded;
        };
        let status = &mut info.status;
        if status.update_date.is_some_and(|date| result.started_at <= date) {
            return ApplyOutcome::Discarded;
        }
        if info.project.deletion_date.is_some() {
            return ApplyOutcome::Discarded;
        }

        let previous = status.last_known_status;
        status.update_date = Some(result.started_at);
        status.request_error = result.request_error.clone();
        status.parse_error = None;
        status.had_response = result.had_response();
        if let Some(code) = result.status_code {
            status.response_status_code = Some(code);
        }
        match result.last_build() {
            Some(build) => apply_build(status, &build),
            // Keep what we knew; only the error is new
            None => status.parse_error = Some(ParseError::json()),
        }
        ApplyOutcome::Applied { previous, current: status.last_known_status }
    }

    pub fn get(&self, project_id: &str) -> Option<&ProjectInfo> { self.entries.get(project_id) }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectInfo> { self.entries.values() }

    /// Projects that are not deleted, in list order.
    pub fn active(&self) -> Vec<&ProjectInfo> {
        let mut active =
            self.entries.values().filter(|info| info.project.is_active()).collect::<Vec<_>>();
        active.sort_by(|a, b| {
            (a.project.list_order, a.project.created_at)
                .cmp(&(b.project.list_order, b.project.created_at))
                .then_with(|| a.project.project_id.cmp(&b.project.project_id))
        });
        active
    }

    pub fn snapshot(&self) -> Vec<ProjectInfo> { self.active().into_iter().cloned().collect() }
}

fn apply_build(status: &mut ProjectStatus, build: &LastBuild) {
    status.building = build.building.unwrap_or(false);
    status.last_build_number = build.number;
    status.culprits = build.culprits_text();
    status.build_description = build.description.clone();
    status.name = Some(build.name());
    status.last_known_status = build.status();
    status.failed_build_number = match status.last_known_status {
        BuildResult::Failure => build.number,
        _ => None,
    };
}

#[cfg(test)]
mod tests {
    use buildwatch_core::models::{Project, RequestError, RequestErrorKind};
    use buildwatch_jenkins::FetchBody;
    use serde_json::{Value, json};
    use time::{Duration, macros::datetime};

    use super::*;

    fn t0() -> UtcDateTime { datetime!(2025-03-01 12:00:00 UTC).to_utc() }

    fn project(title: &str) -> ProjectInfo {
        let mut project = Project::new(title, t0());
        project.url = format!("http://ci.local/job/{title}");
        ProjectInfo { project, status: ProjectStatus::default() }
    }

    fn reply(started_at: UtcDateTime, value: Value) -> FetchResult {
        FetchResult {
            started_at,
            request_error: None,
            status_code: Some(200),
            body: FetchBody::Json(value),
        }
    }

    fn store_with(info: &ProjectInfo) -> ProjectStatusStore {
        let mut store = ProjectStatusStore::new();
        assert_eq!(store.upsert(info.clone()), UpsertOutcome::Inserted);
        store
    }

    #[test]
    fn failure_sets_failed_build_number() {
        let info = project("a");
        let id = &info.project.project_id;
        let mut store = store_with(&info);
        let outcome = store.apply(id, &reply(t0(), json!({ "result": "FAILURE", "number": 42 })));
        assert_eq!(outcome, ApplyOutcome::Applied {
            previous: BuildResult::NotBuilt,
            current: BuildResult::Failure
        });
        let status = &store.get(id).unwrap().status;
        assert_eq!(status.last_known_status, BuildResult::Failure);
        assert_eq!(status.failed_build_number, Some(42));
        assert_eq!(status.last_build_number, Some(42));
        assert_eq!(status.update_date, Some(t0()));
        assert!(status.had_response);
        assert_eq!(status.response_status_code, Some(200));

        store.apply(
            id,
            &reply(t0() + Duration::seconds(20), json!({ "result": "SUCCESS", "number": 43 })),
        );
        let status = &store.get(id).unwrap().status;
        assert_eq!(status.last_known_status, BuildResult::Success);
        assert_eq!(status.failed_build_number, None);
        assert_eq!(status.last_build_number, Some(43));
    }

    #[test]
    fn payload_fields() {
        let info = project("a");
        let id = &info.project.project_id;
        let mut store = store_with(&info);
        store.apply(
            id,
            &reply(
                t0(),
                json!({
                    "result": "UNSTABLE",
                    "building": true,
                    "number": 7,
                    "culprits": ["alice", "bob"],
                    "description": "nightly",
                    "fullDisplayName": "MyJob #42",
                    "displayName": "#42",
                }),
            ),
        );
        let status = &store.get(id).unwrap().status;
        assert_eq!(status.last_known_status, BuildResult::Unstable);
        assert!(status.building);
        assert_eq!(status.culprits.as_deref(), Some("Culprits: alice, bob"));
        assert_eq!(status.build_description.as_deref(), Some("nightly"));
        assert_eq!(status.name.as_deref(), Some("MyJob"));
        assert_eq!(status.failed_build_number, None);
    }

    #[test]
    fn stale_results_are_discarded() {
        let info = project("a");
        let id = &info.project.project_id;
        let mut store = store_with(&info);
        let later = t0() + Duration::seconds(20);
        store.apply(id, &reply(later, json!({ "result": "SUCCESS", "number": 2 })));
        let before = store.get(id).unwrap().clone();

        for started_at in [t0(), later] {
            let outcome = store.apply(
                id,
                &reply(started_at, json!({ "result": "FAILURE", "number": 1, "building": true })),
            );
            assert_eq!(outcome, ApplyOutcome::Discarded);
            assert_eq!(store.get(id).unwrap(), &before);
        }
    }

    #[test]
    fn deleted_and_unknown_projects_are_discarded() {
        let info = project("a");
        let id = &info.project.project_id;
        let mut store = store_with(&info);
        assert!(store.mark_deleted(id, t0()));
        assert!(!store.mark_deleted(id, t0()));
        let result = reply(t0() + Duration::seconds(1), json!({ "result": "FAILURE" }));
        assert_eq!(store.apply(id, &result), ApplyOutcome::Discarded);
        assert_eq!(store.get(id).unwrap().status, ProjectStatus::default());
        assert_eq!(store.apply("unknown", &result), ApplyOutcome::Discarded);
    }

    #[test]
    fn parse_error_keeps_previous_status() {
        let info = project("a");
        let id = &info.project.project_id;
        let mut store = store_with(&info);
        store.apply(id, &reply(t0(), json!({ "result": "FAILURE", "number": 3 })));
        let garbage = FetchResult {
            started_at: t0() + Duration::seconds(20),
            request_error: None,
            status_code: Some(200),
            body: FetchBody::Invalid("expected value at line 1 column 1".to_string()),
        };
        assert_eq!(store.apply(id, &garbage), ApplyOutcome::Applied {
            previous: BuildResult::Failure,
            current: BuildResult::Failure
        });
        let status = &store.get(id).unwrap().status;
        assert_eq!(status.parse_error, Some(ParseError::json()));
        assert_eq!(status.failed_build_number, Some(3));
        assert_eq!(status.update_date, Some(t0() + Duration::seconds(20)));

        // The next good reply clears the error
        store.apply(id, &reply(t0() + Duration::seconds(40), json!({ "result": "FAILURE" })));
        assert_eq!(store.get(id).unwrap().status.parse_error, None);
    }

    #[test]
    fn request_error_resets_to_not_built() {
        let info = project("a");
        let id = &info.project.project_id;
        let mut store = store_with(&info);
        store.apply(id, &reply(t0(), json!({ "result": "SUCCESS", "number": 3 })));
        let error = RequestError {
            kind: RequestErrorKind::Connect,
            description: "connection refused".to_string(),
        };
        let failed = FetchResult {
            started_at: t0() + Duration::seconds(20),
            request_error: Some(error.clone()),
            status_code: None,
            body: FetchBody::Missing,
        };
        assert_eq!(store.apply(id, &failed), ApplyOutcome::Applied {
            previous: BuildResult::Success,
            current: BuildResult::NotBuilt
        });
        let status = &store.get(id).unwrap().status;
        assert_eq!(status.request_error, Some(error));
        assert!(!status.had_response);
        assert_eq!(status.last_build_number, None);
        // Last received HTTP status is kept
        assert_eq!(status.response_status_code, Some(200));
    }

    #[test]
    fn empty_reply() {
        let info = project("a");
        let id = &info.project.project_id;
        let mut store = store_with(&info);
        let empty = FetchResult {
            started_at: t0(),
            request_error: None,
            status_code: Some(200),
            body: FetchBody::Empty,
        };
        store.apply(id, &empty);
        let status = &store.get(id).unwrap().status;
        assert!(!status.had_response);
        assert_eq!(status.last_known_status, BuildResult::NotBuilt);
        assert_eq!(status.describe().as_deref(), Some("Empty response\nHTTP(200)"));
    }

    #[test]
    fn upsert_keeps_status_unless_reconfigured() {
        let info = project("a");
        let id = info.project.project_id.clone();
        let mut store = store_with(&info);
        store.apply(&id, &reply(t0(), json!({ "result": "SUCCESS" })));

        let mut renamed = info.clone();
        renamed.project.title = "renamed".to_string();
        renamed.project.list_order = 0;
        assert_eq!(store.upsert(renamed), UpsertOutcome::Updated);
        let stored = store.get(&id).unwrap();
        assert_eq!(stored.project.title, "renamed");
        assert_eq!(stored.status.last_known_status, BuildResult::Success);

        let mut ignored = store.get(&id).unwrap().clone();
        ignored.project.ignore_for_summary = true;
        assert_eq!(store.upsert(ignored.clone()), UpsertOutcome::SummaryFlagChanged);
        assert_eq!(store.upsert(ignored), UpsertOutcome::Updated);
        assert!(store.get(&id).unwrap().project.ignore_for_summary);

        let reset_at = t0() + Duration::seconds(30);
        let mut moved = info.clone();
        moved.project.url = "http://ci.local/job/other".to_string();
        moved.status = ProjectStatus::reset(reset_at);
        assert_eq!(store.upsert(moved), UpsertOutcome::Reconfigured);
        assert_eq!(store.get(&id).unwrap().status, ProjectStatus::reset(reset_at));

        // A request issued before the reconfiguration is stale
        let old = reply(t0() + Duration::seconds(25), json!({ "result": "FAILURE" }));
        assert_eq!(store.apply(&id, &old), ApplyOutcome::Discarded);
    }

    #[test]
    fn retain_and_purge() {
        let a = project("a");
        let b = project("b");
        let mut store = store_with(&a);
        store.upsert(b.clone());
        let active = HashSet::from([b.project.project_id.clone()]);
        assert_eq!(store.retain_active(&active, t0()), vec![a.project.project_id.clone()]);
        assert!(store.retain_active(&active, t0()).is_empty());
        assert_eq!(store.active().len(), 1);

        assert!(store.purge(t0() - Duration::seconds(1)).is_empty());
        assert_eq!(store.purge(t0()), vec![a.project.project_id.clone()]);
        assert!(store.get(&a.project.project_id).is_none());
        assert!(store.get(&b.project.project_id).is_some());
    }

    #[test]
    fn active_in_list_order() {
        let mut store = ProjectStatusStore::new();
        for (title, order) in [("c", 2), ("a", 0), ("b", 1)] {
            let mut info = project(title);
            info.project.list_order = order;
            store.upsert(info);
        }
        let titles =
            store.active().iter().map(|info| info.project.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, ["a", "b", "c"]);
    }
}
