//! Usage search
//!
//! Collects the references to the symbol under a cursor. Declaration sites
//! are never reported. Member references are matched through their receiver
//! type so that `save` on a `UserRepository` is not confused with `save` on
//! an unrelated `AuditLog`; free-standing names never match property accesses.
//!
//! With module scoping on, only files of the modules that can see the
//! querying file's module are searched (see [`ModuleGraph::accessible_modules`]).

use anyhow::Result;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::models::{Position, Range, UsageLocation};
use crate::module_graph::ModuleGraph;
use crate::parsers::typescript::{
    is_declaration_name, is_identifier, node_text, property_access_of, Preorder,
};
use crate::parsers::ParserFactory;
use crate::resolver::{container_class_name, symbol_at};
use crate::workspace::{DocumentProvider, FileEnumerator, TextDocument, SOURCE_GLOB};

/// Number of candidate files read and searched concurrently
const SEARCH_BATCH_SIZE: usize = 10;

/// References to `name` in one document
///
/// With a `container`, only property accesses whose receiver resolves to that
/// type in this document are accepted. Without one, property accesses are
/// rejected.
pub fn usages_in(
    document: &TextDocument,
    name: &str,
    container: Option<&str>,
) -> Result<Vec<UsageLocation>> {
    let source = document.text();
    let tree = ParserFactory::parse(document.path(), source)?;
    let root = tree.root_node();

    let mut usages = Vec::new();
    for node in Preorder::new(root) {
        if !is_identifier(&node) || node_text(node, source) != name || is_declaration_name(node) {
            continue;
        }

        let accepted = match container {
            Some(container) => {
                property_access_of(node).is_some()
                    && container_class_name(root, node, source).as_deref() == Some(container)
            }
            None => property_access_of(node).is_none(),
        };
        if !accepted {
            continue;
        }

        let start = document.position_of_point(node.start_position());
        let end = document.position_of_point(node.end_position());
        usages.push(UsageLocation {
            path: document.path().to_path_buf(),
            range: Range::new(start, end),
            preview: document
                .line_text(start.line)
                .map(|line| line.trim().to_string())
                .unwrap_or_default(),
            module_name: None,
        });
    }

    Ok(usages)
}

/// Workspace-wide usage search
pub struct UsageFinder<'a> {
    files: &'a dyn FileEnumerator,
    documents: &'a dyn DocumentProvider,
    exclude_patterns: &'a [String],
}

impl<'a> UsageFinder<'a> {
    pub fn new(
        files: &'a dyn FileEnumerator,
        documents: &'a dyn DocumentProvider,
        exclude_patterns: &'a [String],
    ) -> Self {
        Self {
            files,
            documents,
            exclude_patterns,
        }
    }

    /// Usages of the symbol at `position`, sorted by (path, line, character)
    ///
    /// `container_name` overrides receiver inference. When the symbol is a
    /// property access whose receiver type cannot be inferred, nothing is
    /// returned rather than guessing.
    pub async fn find_usages(
        &self,
        document: &TextDocument,
        position: Position,
        enable_scoping: bool,
        container_name: Option<&str>,
        graph: Option<&ModuleGraph>,
    ) -> Result<Vec<UsageLocation>> {
        let Some(query) = symbol_at(document, position)? else {
            return Ok(Vec::new());
        };

        let container = match container_name {
            Some(name) => Some(name.to_string()),
            None if query.is_property_access => match query.receiver_type {
                Some(receiver) => Some(receiver),
                None => {
                    log::debug!(
                        "Receiver of {} could not be resolved; skipping usage search",
                        query.name
                    );
                    return Ok(Vec::new());
                }
            },
            None => query.declared_in,
        };

        let candidates = self
            .candidate_files(document.path(), enable_scoping, graph)
            .await?;
        log::debug!(
            "Searching {} files for usages of {} (container: {:?})",
            candidates.len(),
            query.name,
            container
        );

        let mut usages = Vec::new();
        for batch in candidates.chunks(SEARCH_BATCH_SIZE) {
            let searches = batch
                .iter()
                .map(|path| self.search_file(path, document, &query.name, container.as_deref()));
            for found in join_all(searches).await {
                usages.extend(found);
            }
        }

        if let Some(graph) = graph {
            for usage in &mut usages {
                usage.module_name = graph.module_for_file(&usage.path).map(|m| m.name.clone());
            }
        }

        usages.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then(a.range.start.line.cmp(&b.range.start.line))
                .then(a.range.start.character.cmp(&b.range.start.character))
        });
        usages.dedup_by(|a, b| a.path == b.path && a.range == b.range);

        Ok(usages)
    }

    /// Files that may reference a symbol declared in `path`
    async fn candidate_files(
        &self,
        path: &Path,
        enable_scoping: bool,
        graph: Option<&ModuleGraph>,
    ) -> Result<Vec<PathBuf>> {
        let scope = graph
            .filter(|_| enable_scoping)
            .and_then(|graph| graph.module_for_file(path).map(|module| (graph, module.name.clone())));

        let Some((graph, module)) = scope else {
            return self.files.find_files(SOURCE_GLOB, self.exclude_patterns).await;
        };

        let mut files = BTreeSet::new();
        for name in graph.accessible_modules(&module) {
            let Some(node) = graph.get(&name) else {
                continue;
            };
            files.insert(node.module.file_path.clone());
            files.extend(
                self.files
                    .find_files_in(node.module.directory(), SOURCE_GLOB, self.exclude_patterns)
                    .await?,
            );
        }

        log::debug!("Scoped search for {} covers {} files", module, files.len());
        Ok(files.into_iter().collect())
    }

    /// Usages in one candidate file; read and parse failures yield nothing
    async fn search_file(
        &self,
        path: &Path,
        querying: &TextDocument,
        name: &str,
        container: Option<&str>,
    ) -> Vec<UsageLocation> {
        let result = if path == querying.path() {
            usages_in(querying, name, container)
        } else {
            match self.documents.open(path).await {
                Ok(document) => usages_in(&document, name, container),
                Err(e) => Err(e),
            }
        };

        result.unwrap_or_else(|e| {
            log::warn!("Skipping {} during usage search: {:#}", path.display(), e);
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Module;
    use crate::workspace::FsWorkspace;
    use std::fs;
    use tempfile::TempDir;

    fn doc(source: &str) -> TextDocument {
        TextDocument::new("/ws/test.ts", source)
    }

    fn lines(usages: &[UsageLocation]) -> Vec<usize> {
        usages.iter().map(|u| u.range.start.line).collect()
    }

    #[test]
    fn test_declaration_sites_are_excluded() {
        let document = doc(r#"
export function format(value: string) { return value; }
const a = format('x');
const handlers = { format: format };
"#);

        let usages = usages_in(&document, "format", None).unwrap();
        // the call on line 2 and the object value on line 3, not the key or the declaration
        assert_eq!(lines(&usages), vec![2, 3]);
        assert_eq!(usages[1].range.start.character, 27);
    }

    #[test]
    fn test_unconstrained_search_rejects_property_accesses() {
        let document = doc("save();\nrepo.save();\n");
        let usages = usages_in(&document, "save", None).unwrap();
        assert_eq!(lines(&usages), vec![0]);
        assert_eq!(usages[0].preview, "save();");
    }

    #[test]
    fn test_container_filtering_by_receiver_type() {
        let document = doc(r#"
class Service {
    constructor(private users: UserRepository, private audit: AuditLog) {}
    run() {
        this.users.save();
        this.audit.save();
        save();
    }
}
"#);

        let users = usages_in(&document, "save", Some("UserRepository")).unwrap();
        assert_eq!(lines(&users), vec![4]);

        let audit = usages_in(&document, "save", Some("AuditLog")).unwrap();
        assert_eq!(lines(&audit), vec![5]);
    }

    #[test]
    fn test_this_member_usages_match_enclosing_class() {
        let document = doc("class Counter {\n  reset() {}\n  inc() { this.reset(); }\n}\n");
        let usages = usages_in(&document, "reset", Some("Counter")).unwrap();
        assert_eq!(lines(&usages), vec![2]);
    }

    async fn search(
        root: &Path,
        file: &str,
        needle: &str,
        scoping: bool,
        graph: Option<&ModuleGraph>,
    ) -> Vec<UsageLocation> {
        let workspace = FsWorkspace::new(root);
        let finder = UsageFinder::new(&workspace, &workspace, &[]);
        let document = workspace.open(&root.join(file)).await.unwrap();
        let offset = document.text().find(needle).unwrap();
        let position = document.position_at(offset);
        finder
            .find_usages(&document, position, scoping, None, graph)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unresolved_receiver_returns_nothing() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.ts"), "const c = make();\nc.send();\nsend();\n").unwrap();

        let usages = search(temp.path(), "a.ts", "send", false, None).await;
        assert!(usages.is_empty());
    }

    #[tokio::test]
    async fn test_member_declaration_uses_its_class_as_container() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("repo.ts"), "export class Repo {\n  save() {}\n}\n").unwrap();
        fs::write(
            root.join("job.ts"),
            "function run(repo: Repo, log: Log) {\n  repo.save();\n  log.save();\n}\n",
        )
        .unwrap();

        let usages = search(root, "repo.ts", "save", false, None).await;
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].path, root.join("job.ts"));
        assert_eq!(usages[0].range.start, Position::new(1, 7));
    }

    #[tokio::test]
    async fn test_parameter_property_usages_from_declaration_and_access() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(
            root.join("user.controller.ts"),
            "export class UserController {\n  constructor(private readonly users: UserService) {}\n  list() { return this.users.findAll(); }\n  raw() { return this.users; }\n}\n",
        )
        .unwrap();

        let expected = vec![Position::new(2, 23), Position::new(3, 22)];
        let starts = |usages: Vec<UsageLocation>| -> Vec<Position> {
            usages.iter().map(|u| u.range.start).collect()
        };

        let from_parameter = search(root, "user.controller.ts", "users", false, None).await;
        assert_eq!(starts(from_parameter), expected);

        let from_access = search(root, "user.controller.ts", "users.findAll", false, None).await;
        assert_eq!(starts(from_access), expected);
    }

    #[tokio::test]
    async fn test_results_are_sorted_and_annotated() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src/user")).unwrap();
        fs::write(root.join("src/user/b.ts"), "helper();\nhelper();\n").unwrap();
        fs::write(root.join("src/user/a.ts"), "export function helper() {}\nhelper();\n").unwrap();

        let graph = ModuleGraph::from_modules([Module {
            name: "UserModule".to_string(),
            file_path: root.join("src/user/user.module.ts"),
            ..Default::default()
        }]);

        let usages = search(root, "src/user/a.ts", "helper", true, Some(&graph)).await;
        let found: Vec<(PathBuf, usize)> = usages
            .iter()
            .map(|u| (u.path.clone(), u.range.start.line))
            .collect();
        assert_eq!(
            found,
            vec![
                (root.join("src/user/a.ts"), 1),
                (root.join("src/user/b.ts"), 0),
                (root.join("src/user/b.ts"), 1),
            ]
        );
        assert!(usages.iter().all(|u| u.module_name.as_deref() == Some("UserModule")));
    }

    #[tokio::test]
    async fn test_unreadable_file_does_not_abort_search() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.ts"), "export function ping() {}\nping();\n").unwrap();
        // invalid UTF-8 fails to read as text
        fs::write(root.join("b.ts"), [0xff, 0xfe, 0x00]).unwrap();

        let usages = search(root, "a.ts", "ping", false, None).await;
        assert_eq!(usages.len(), 1);
    }
}
