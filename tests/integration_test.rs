//! Integration tests for modscope
//!
//! Each test writes a small workspace to a temporary directory and drives the
//! analyzer through change notifications the way the watcher does.


use modscope::config::{config_path, load_config};
use modscope::{Analyzer, AnalyzerConfig, AnalyzerState, ChangeKind, FileChange};
use std::fs;
use tempfile::TempDir;
use test_helpers::*;

const USER_MODULE: &str = r#"
@Module({ providers: [UserService], exports: [UserService] })
export class UserModule {}
"#;

const USER_SERVICE: &str = r#"
@Injectable()
export class UserService {
  findAll() { return []; }
}
"#;

const APP_MODULE: &str = r#"
@Module({ imports: [UserModule] })
export class AppModule {}
"#;

const BILLING_MODULE: &str = r#"
@Module({ providers: [BillingService] })
export class BillingModule {}
"#;

const BILLING_SERVICE: &str = r#"
export class BillingService {
  constructor(private users: UserService) {}
}
"#;

fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_files(
        temp.path(),
        &[
            ("src/user/user.module.ts", USER_MODULE),
            ("src/user/user.service.ts", USER_SERVICE),
            ("src/app/app.module.ts", APP_MODULE),
            (
                "src/app/app.service.ts",
                "export class AppService {\n  constructor(private users: UserService) {}\n}\n",
            ),
            ("src/billing/billing.module.ts", BILLING_MODULE),
            ("src/billing/billing.service.ts", BILLING_SERVICE),
        ],
    );
    temp
}

#[tokio::test]
async fn test_full_workflow() {
    let temp = workspace();
    let root = temp.path().canonicalize().unwrap();
    let analyzer = Analyzer::for_root(&root, AnalyzerConfig::default());
    assert_eq!(analyzer.state().await, AnalyzerState::Uninitialized);

    let service = root.join("src/user/user.service.ts");
    let usages = analyzer
        .find_usages(&service, position_of(&service, "UserService", 0))
        .await
        .unwrap();
    assert_eq!(analyzer.state().await, AnalyzerState::Ready);

    let files = usage_files(&root, &usages);
    assert!(files.contains("src/app/app.service.ts"));
    assert!(files.contains("src/user/user.module.ts"));
    assert!(!files.contains("src/billing/billing.service.ts"));
}

#[tokio::test]
async fn test_cached_results_refresh_after_change_notification() {
    let temp = workspace();
    let root = temp.path().canonicalize().unwrap();
    let analyzer = Analyzer::for_root(&root, AnalyzerConfig::default());

    let service = root.join("src/user/user.service.ts");
    let position = position_of(&service, "UserService", 0);
    let before = analyzer.find_usages(&service, position).await.unwrap();

    fs::write(
        root.join("src/app/app.service.ts"),
        "export class AppService {\n  constructor(private users: UserService, private admin: UserService) {}\n}\n",
    )
    .unwrap();

    // Served from cache until the queried file is reported as changed
    let cached = analyzer.find_usages(&service, position).await.unwrap();
    assert_eq!(cached, before);

    analyzer
        .handle_file_change(&FileChange::new(&service, ChangeKind::Changed))
        .await
        .unwrap();
    let refreshed = analyzer.find_usages(&service, position).await.unwrap();
    assert_eq!(refreshed.len(), before.len() + 1);
}

#[tokio::test]
async fn test_module_file_change_widens_scope() {
    let temp = workspace();
    let root = temp.path().canonicalize().unwrap();
    let analyzer = Analyzer::for_root(&root, AnalyzerConfig::default());

    let service = root.join("src/user/user.service.ts");
    let position = position_of(&service, "UserService", 0);
    let before = analyzer.find_usages(&service, position).await.unwrap();
    assert!(!usage_files(&root, &before).contains("src/billing/billing.service.ts"));

    let billing_module = root.join("src/billing/billing.module.ts");
    fs::write(
        &billing_module,
        "@Module({ imports: [UserModule], providers: [BillingService] })\nexport class BillingModule {}\n",
    )
    .unwrap();
    analyzer
        .handle_file_change(&FileChange::new(&billing_module, ChangeKind::Changed))
        .await
        .unwrap();
    assert_eq!(analyzer.state().await, AnalyzerState::Ready);

    let after = analyzer.find_usages(&service, position).await.unwrap();
    let files = usage_files(&root, &after);
    assert!(files.contains("src/billing/billing.service.ts"));
    assert_eq!(
        after
            .iter()
            .find(|u| u.path.ends_with("billing.service.ts"))
            .and_then(|u| u.module_name.as_deref()),
        Some("BillingModule")
    );
}

#[tokio::test]
async fn test_deleted_module_file_falls_back_to_workspace_search() {
    let temp = workspace();
    let root = temp.path().canonicalize().unwrap();
    let analyzer = Analyzer::for_root(&root, AnalyzerConfig::default());

    let service = root.join("src/user/user.service.ts");
    assert_eq!(
        analyzer.get_module_for_file(&service).await.unwrap().as_deref(),
        Some("UserModule")
    );

    let user_module = root.join("src/user/user.module.ts");
    fs::remove_file(&user_module).unwrap();
    analyzer
        .handle_file_change(&FileChange::new(&user_module, ChangeKind::Deleted))
        .await
        .unwrap();

    assert_eq!(analyzer.get_module_for_file(&service).await.unwrap(), None);

    // Without an owning module every workspace file is searched
    let usages = analyzer
        .find_usages(&service, position_of(&service, "UserService", 0))
        .await
        .unwrap();
    assert!(usage_files(&root, &usages).contains("src/billing/billing.service.ts"));
}

#[tokio::test]
async fn test_config_file_disables_scoping() {
    let temp = workspace();
    let root = temp.path().canonicalize().unwrap();
    fs::create_dir_all(config_path(&root).parent().unwrap()).unwrap();
    fs::write(
        config_path(&root),
        "[analyzer]\nenable_module_scoping = false\ncache_size = 4\n",
    )
    .unwrap();

    let config = load_config(&root).unwrap();
    assert!(!config.enable_module_scoping);
    assert_eq!(config.cache_size, 4);

    let analyzer = Analyzer::for_root(&root, config);
    let service = root.join("src/user/user.service.ts");
    let usages = analyzer
        .find_usages(&service, position_of(&service, "UserService", 0))
        .await
        .unwrap();
    assert!(usage_files(&root, &usages).contains("src/billing/billing.service.ts"));
}

#[tokio::test]
async fn test_excluded_directories_are_never_searched() {
    let temp = workspace();
    let root = temp.path().canonicalize().unwrap();
    write_files(
        &root,
        &[
            ("node_modules/lib/index.ts", "export const s: UserService = make();\n"),
            ("dist/user/user.service.ts", "new UserService();\n"),
        ],
    );

    let config = AnalyzerConfig {
        enable_module_scoping: false,
        ..AnalyzerConfig::default()
    };
    let analyzer = Analyzer::for_root(&root, config);
    let service = root.join("src/user/user.service.ts");
    let usages = analyzer
        .find_usages(&service, position_of(&service, "UserService", 0))
        .await
        .unwrap();

    let files = usage_files(&root, &usages);
    assert!(!files.iter().any(|f| f.starts_with("node_modules") || f.starts_with("dist")));
    assert!(files.contains("src/app/app.service.ts"));
}

#[tokio::test]
async fn test_malformed_file_does_not_abort_queries() {
    let temp = workspace();
    let root = temp.path().canonicalize().unwrap();
    write_files(
        &root,
        &[("src/user/broken.ts", "export const = = (( ]] {\n")],
    );

    let analyzer = Analyzer::for_root(&root, AnalyzerConfig::default());
    let service = root.join("src/user/user.service.ts");

    let usages = analyzer
        .find_usages(&service, position_of(&service, "UserService", 0))
        .await
        .unwrap();
    assert!(usage_files(&root, &usages).contains("src/app/app.service.ts"));

    let app_service = root.join("src/app/app.service.ts");
    let definition = analyzer
        .find_definition(&app_service, position_of(&app_service, "UserService", 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(definition.path, service);
}
