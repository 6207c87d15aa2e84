use buildwatch_core::models::{BuildResult, Project, ProjectStatus};

/// Overall indicator of the active projects not excluded from the summary.
pub fn summarize<'a>(
    projects: impl IntoIterator<Item = (&'a Project, &'a ProjectStatus)>,
) -> BuildResult {
    let mut any_success = false;
    let mut any_unstable = false;
    for (project, status) in projects {
        if !project.is_active() || project.ignore_for_summary {
            continue;
        }
        match status.last_known_status {
            BuildResult::Failure => return BuildResult::Failure,
            BuildResult::Success => any_success = true,
            BuildResult::Unstable => any_unstable = true,
            BuildResult::Aborted | BuildResult::NotBuilt => {}
        }
    }
    if any_success {
        BuildResult::Success
    } else if any_unstable {
        BuildResult::Unstable
    } else {
        BuildResult::NotBuilt
    }
}

/// Remembers the last published indicator.
#[derive(Debug, Default)]
pub struct SummaryAggregator {
    current: Option<BuildResult>,
}

impl SummaryAggregator {
    pub fn new() -> Self { Self::default() }

    /// Returns the new indicator when it differs from the last one published.
    pub fn update(&mut self, indicator: BuildResult) -> Option<BuildResult> {
        if self.current == Some(indicator) {
            return None;
        }
        self.current = Some(indicator);
        Some(indicator)
    }

    pub fn current(&self) -> BuildResult { self.current.unwrap_or_default() }
}

#[cfg(test)]
mod tests {
    use time::UtcDateTime;

    use super::*;

    fn project(title: &str, result: BuildResult, ignored: bool) -> (Project, ProjectStatus) {
        let mut project = Project::new(title, UtcDateTime::now());
        project.ignore_for_summary = ignored;
        (project, ProjectStatus { last_known_status: result, ..ProjectStatus::default() })
    }

    fn run(projects: &[(Project, ProjectStatus)]) -> BuildResult {
        summarize(projects.iter().map(|(project, status)| (project, status)))
    }

    #[test]
    fn test_summarize() {
        use BuildResult::*;
        let cases: &[(&[(BuildResult, bool)], BuildResult)] = &[
            (&[], NotBuilt),
            (&[(Failure, false), (Success, false)], Failure),
            (&[(Failure, true), (Success, false)], Success),
            (&[(Unstable, false), (Success, false)], Success),
            (&[(Unstable, false), (Aborted, false)], Unstable),
            (&[(Aborted, false), (NotBuilt, false)], NotBuilt),
            (&[(Failure, true)], NotBuilt),
        ];
        for (statuses, expected) in cases {
            let projects = statuses
                .iter()
                .enumerate()
                .map(|(i, &(result, ignored))| project(&format!("Project {i}"), result, ignored))
                .collect::<Vec<_>>();
            assert_eq!(run(&projects), *expected, "{statuses:?}");
        }
    }

    #[test]
    fn deleted_projects_do_not_count() {
        let (mut project, status) = project("a", BuildResult::Failure, false);
        project.deletion_date = Some(UtcDateTime::now());
        assert_eq!(summarize([(&project, &status)]), BuildResult::NotBuilt);
    }

    #[test]
    fn aggregator_reports_changes_only() {
        let mut aggregator = SummaryAggregator::new();
        assert_eq!(aggregator.current(), BuildResult::NotBuilt);
        assert_eq!(aggregator.update(BuildResult::NotBuilt), Some(BuildResult::NotBuilt));
        assert_eq!(aggregator.update(BuildResult::NotBuilt), None);
        assert_eq!(aggregator.update(BuildResult::Failure), Some(BuildResult::Failure));
        assert_eq!(aggregator.update(BuildResult::Failure), None);
        assert_eq!(aggregator.current(), BuildResult::Failure);
    }
}
