//! List command - list the selected releases

use console::style;
use shipfile_core::DecryptCache;
use shipfile_state::{StateResolver, visit};

use super::{StateArgs, state_resolver};
use crate::display::{self, ReleaseRow};
use crate::error::{CliError, Result};

/// Run the list command
pub fn run(args: &StateArgs, output_json: bool) -> Result<()> {
    let rows = collect_rows(&state_resolver(args, DecryptCache::new()), args)?;

    if output_json {
        let json = serde_json::to_string_pretty(&rows).map_err(|e| CliError::internal(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    let mut lines = display::release_table(&rows).into_iter();
    if let Some(header) = lines.next() {
        println!("{}", style(header).bold());
    }
    for line in lines {
        println!("{}", line);
    }

    Ok(())
}

/// Rows for every selected release, in visitation order
pub fn collect_rows(resolver: &StateResolver, args: &StateArgs) -> Result<Vec<ReleaseRow>> {
    let mut rows = Vec::new();

    let errors = visit::<CliError, _>(resolver, &args.visit_options(false), |state| {
        rows.extend(state.releases.iter().map(ReleaseRow::from_release));
        Ok(())
    });
    CliError::aggregate(errors)?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipfile_core::MemoryFileSystem;
    use std::sync::Arc;

    fn resolver() -> StateResolver {
        let fs = MemoryFileSystem::new("/work").with_files([
            (
                "shipfile.yaml",
                "helmfiles:\n  - apps/*.yaml\nreleases:\n  - name: ingress\n    chart: stable/nginx\n    labels: {tier: edge}\n",
            ),
            (
                "apps/web.yaml",
                "releases:\n  - name: web\n    chart: charts/web\n    namespace: apps\n    labels: {tier: frontend}\n",
            ),
        ]);
        StateResolver::new(Arc::new(fs))
    }

    fn args() -> StateArgs {
        StateArgs {
            environment: "default".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rows_follow_visitation_order() {
        let rows = collect_rows(&resolver(), &args()).unwrap();

        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["web", "ingress"]);
        assert_eq!(rows[0].namespace, "apps");
        assert_eq!(rows[1].labels, "tier:edge");
    }

    #[test]
    fn test_namespace_flag_fills_missing_namespaces() {
        let args = StateArgs {
            namespace: Some("kube-system".into()),
            ..args()
        };
        let rows = collect_rows(&resolver(), &args).unwrap();

        assert_eq!(rows[0].namespace, "apps");
        assert_eq!(rows[1].namespace, "kube-system");
    }

    #[test]
    fn test_selectors() {
        let args = StateArgs {
            selectors: vec!["tier=frontend".into(), "name=ingress".into()],
            ..args()
        };
        assert_eq!(collect_rows(&resolver(), &args).unwrap().len(), 2);

        let args = StateArgs {
            selectors: vec!["tier!=edge".into()],
            ..self::args()
        };
        let rows = collect_rows(&resolver(), &args).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "web");
    }

    #[test]
    fn test_malformed_selector() {
        let args = StateArgs {
            selectors: vec!["tier".into()],
            ..args()
        };
        let err = collect_rows(&resolver(), &args).unwrap_err();

        assert_eq!(err.exit_code(), crate::exit_codes::VALIDATION_ERROR);
        assert!(err.to_string().contains("Malformed label: tier. Expected label in form k=v or k!=v"));
    }
}
