// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end compiles over in-memory and on-disk file sets

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use smc_compiler::{
    CompileError, Compiler, CompilerConfig, FileLoader, FsLoader, MemoryLoader, Result,
};

const BASE: &str = "/srv/";

fn module(body: &str) -> String {
    format!("define(function (require, exports, module) {{\n{}\n}});", body)
}

fn compiler(loader: &Arc<MemoryLoader>) -> Compiler {
    let config = CompilerConfig::new(BASE).with_stamp_template("");
    Compiler::new(config, loader.clone()).unwrap()
}

#[tokio::test]
async fn test_diamond_is_flattened_once_in_load_order() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/app/main.js", module("require('./a');\nrequire('./b');"))
            .with_file("/srv/app/a.js", module("require('./c');"))
            .with_file("/srv/app/b.js", module("require('./c');"))
            .with_file("/srv/app/c.js", module("")),
    );
    let compiler = compiler(&loader);

    let compiled = compiler.compile("#app/main").await.unwrap().unwrap();
    assert_eq!(
        compiled.file.flattened,
        vec!["/srv/app/c.js", "/srv/app/a.js", "/srv/app/b.js"]
    );
    assert!(compiled.code.contains(
        "define(\"#app/main\", [\"#app/c\", \"#app/a\", \"#app/b\"], function (require, exports, module)"
    ));
    assert!(
        compiled
            .code
            .starts_with("// #optional </srv/app/a.js>\n// #optional </srv/app/b.js>\n\n")
    );

    // c is compiled once and shared
    assert_eq!(loader.load_count("/srv/app/c.js"), 1);
}

#[tokio::test]
async fn test_cycle_reports_full_chain() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/a.js", module("require('./b');"))
            .with_file("/srv/b.js", module("require('./a');")),
    );
    let compiler = compiler(&loader);

    let err = compiler.compile("/srv/a.js").await.unwrap_err();
    assert!(matches!(err, CompileError::CircularDependency { .. }));
    assert_eq!(
        err.to_string(),
        "Circular dependencies found: /srv/a.js -> /srv/b.js -> /srv/a.js"
    );
    assert_eq!(compiler.cache_len(), 0);
}

#[tokio::test]
async fn test_self_cycle() {
    let loader = Arc::new(MemoryLoader::new().with_file("/srv/a.js", module("require('./a');")));
    let compiler = compiler(&loader);

    let err = compiler.compile("#a").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Circular dependencies found: /srv/a.js -> /srv/a.js"
    );
}

#[tokio::test]
async fn test_ranged_reference_takes_nearest_pin() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/app/package.json", r#"{"alias": {"x": "lib/x/2.0.0"}}"#)
            .with_file("/srv/app/main.js", module("require('./util');"))
            .with_file("/srv/app/util.js", module("require('#lib/x/1.0.0+/x');"))
            .with_file("/srv/lib/x/2.0.0/x.js", module("")),
    );
    let compiler = compiler(&loader);

    let compiled = compiler.compile("#app/main").await.unwrap().unwrap();
    assert_eq!(
        compiled.file.flattened,
        vec!["/srv/lib/x/2.0.0/x.js", "/srv/app/util.js"]
    );

    let util = compiler.cached("/srv/app/util.js").unwrap();
    assert_eq!(util.dependencies, vec!["/srv/lib/x/1.0.0+/x.js"]);
    assert_eq!(util.children[0].pathname(), "/srv/lib/x/2.0.0/x.js");
}

#[tokio::test]
async fn test_entry_require_is_rewritten_to_pinned_id() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/app/package.json", r#"{"alias": {"x": "lib/x/2.0.0"}}"#)
            .with_file("/srv/app/main.js", module("var x = require('#lib/x/1.0.0+/x');"))
            .with_file("/srv/lib/x/2.0.0/x.js", module("")),
    );
    let config = CompilerConfig::new(BASE);
    let compiler = Compiler::new(config, loader.clone()).unwrap();

    let compiled = compiler.compile("#app/main").await.unwrap().unwrap();
    assert!(
        compiled
            .code
            .contains("var x = require('#lib/x/2.0.0/x?t=#ts(\"/srv/lib/x/2.0.0/x.js\")');")
    );
    assert!(compiled.code.starts_with("// #optional </srv/lib/x/2.0.0/x.js>\n\n"));
}

#[tokio::test]
async fn test_version_conflict_names_every_ancestor() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/app/package.json", r#"{"alias": {"x": "lib/x/2.0.0+"}}"#)
            .with_file("/srv/app/main.js", module("require('./mid');"))
            .with_file("/srv/app/mid.js", module("require('#vendor/v');"))
            .with_file("/srv/vendor/package.json", r#"{"alias": {"x": "lib/x/1.0.0-"}}"#)
            .with_file("/srv/vendor/v.js", module("require('#lib/x/1.5.0+/x');")),
    );
    let compiler = compiler(&loader);

    let err = compiler.compile("#app/main").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Version of \"/srv/lib/x\" conflicts: \
         /srv/app/main.js(2.0.0+) -> /srv/app/mid.js(2.0.0+) -> /srv/vendor/v.js(1.0.0-)"
    );
}

#[tokio::test]
async fn test_alias_substitution() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file(
                "/srv/app/package.json",
                r#"{"alias": {"foo": "vendor/foo/1.0.0"}}"#,
            )
            .with_file("/srv/app/main.js", module("var bar = require('foo/bar');"))
            .with_file("/srv/vendor/foo/1.0.0/bar.js", module("")),
    );
    let compiler = compiler(&loader);

    let compiled = compiler.compile("#app/main").await.unwrap().unwrap();
    assert!(compiled.code.contains("var bar = require('#vendor/foo/1.0.0/bar');"));
    assert_eq!(compiled.file.flattened, vec!["/srv/vendor/foo/1.0.0/bar.js"]);
    assert_eq!(
        compiled.file.scope.origin(),
        Some("/srv/app/package.json")
    );
}

#[tokio::test]
async fn test_missing_descriptor_gives_empty_scope() {
    let loader = Arc::new(MemoryLoader::new().with_file("/srv/app/main.js", module("")));
    let compiler = compiler(&loader);

    let compiled = compiler.compile("#app/main").await.unwrap().unwrap();
    assert!(compiled.file.scope.is_empty());
    assert_eq!(compiled.file.scope.origin(), None);
    assert_eq!(loader.load_count("/srv/app/package.json"), 1);
    assert_eq!(loader.load_count("/package.json"), 1);
}

#[tokio::test]
async fn test_malformed_descriptor_is_fatal() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/package.json", "{ not json")
            .with_file("/srv/app/main.js", module("")),
    );
    let compiler = compiler(&loader);

    let err = compiler.compile("#app/main").await.unwrap_err();
    assert!(matches!(err, CompileError::MalformedDescriptor { .. }));
}

#[tokio::test]
async fn test_deferred_and_sentinel_dependencies_are_absent() {
    let loader = Arc::new(MemoryLoader::new().with_file(
        "/srv/app/main.js",
        module("require('$');\nrequire('#lib/x/1.0.0+/x');"),
    ));
    let compiler = compiler(&loader);

    let compiled = compiler.compile("#app/main").await.unwrap().unwrap();
    assert!(compiled.file.flattened.is_empty());
    assert!(compiled.file.children.iter().all(|child| child.is_absent()));
    assert!(!compiled.code.contains("#optional"));
    assert!(compiled.code.starts_with("define(\"#app/main\", [], function"));
    assert_eq!(loader.load_count("/srv/lib/x/1.0.0+/x.js"), 0);
}

#[tokio::test]
async fn test_missing_dependency_fails() {
    let loader = Arc::new(
        MemoryLoader::new().with_file("/srv/app/main.js", module("require('./gone');")),
    );
    let compiler = compiler(&loader);

    let err = compiler.compile("#app/main").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Cannot find file '/srv/app/gone.js'");
}

#[tokio::test]
async fn test_relative_entry_is_taken_from_base() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/app/main.js", module("require('./util');"))
            .with_file("/srv/app/util.js", module("")),
    );
    let compiler = compiler(&loader);

    let compiled = tokio::time::timeout(Duration::from_secs(5), compiler.compile("app/main.js"))
        .await
        .expect("relative entry compiles without hanging")
        .unwrap()
        .unwrap();
    assert_eq!(compiled.file.pathname, "/srv/app/main.js");
    assert_eq!(compiled.file.flattened, vec!["/srv/app/util.js"]);
    assert_eq!(loader.load_count("/package.json"), 1);
}

#[tokio::test]
async fn test_verbatim_id_without_extension() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/app/main.js", module("require('#app/tpl#');"))
            .with_file("/srv/app/tpl", module("")),
    );
    let compiler = compiler(&loader);

    let compiled = compiler.compile("#app/main").await.unwrap().unwrap();
    assert_eq!(compiled.file.flattened, vec!["/srv/app/tpl"]);
    assert!(compiled.code.contains("define(\"#app/main\", [\"#app/tpl\"], function"));
}

#[tokio::test]
async fn test_cached_files_are_not_reloaded() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/app/main.js", module("require('./util');"))
            .with_file("/srv/app/util.js", module("")),
    );
    let compiler = compiler(&loader);

    let first = compiler.compile("#app/main").await.unwrap().unwrap();
    let second = compiler.compile("#app/main").await.unwrap().unwrap();

    assert_eq!(first.code, second.code);
    assert!(Arc::ptr_eq(&first.file, &second.file));
    assert_eq!(loader.load_count("/srv/app/main.js"), 1);
    assert_eq!(loader.load_count("/srv/app/util.js"), 1);
    assert_eq!(compiler.cache_len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_compile_all_shares_the_cache() {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_file("/srv/one.js", module("require('./shared');"))
            .with_file("/srv/two.js", module("require('./shared');"))
            .with_file("/srv/shared.js", module("")),
    );
    let compiler = compiler(&loader);

    let results = compiler.compile_all(&["#one", "#two"]).await.unwrap();
    let ids: Vec<&str> = results
        .iter()
        .map(|compiled| compiled.as_ref().unwrap().file.id.as_str())
        .collect();
    assert_eq!(ids, vec!["#one", "#two"]);

    let shared = compiler.cached("/srv/shared.js").unwrap();
    for compiled in results.iter().flatten() {
        let child = compiled.file.children[0].as_module().unwrap();
        assert!(Arc::ptr_eq(child, &shared));
    }
}

/// Sleeps before the first load of one pathname
struct SlowLoader {
    inner: MemoryLoader,
    slow: &'static str,
    delayed: AtomicBool,
}

#[async_trait]
impl FileLoader for SlowLoader {
    async fn load(&self, pathname: &str) -> Result<String> {
        if pathname == self.slow && !self.delayed.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        self.inner.load(pathname).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_compile_leaves_cache_consistent() {
    let loader = Arc::new(SlowLoader {
        inner: MemoryLoader::new()
            .with_file("/srv/main.js", module("require('./fast');\nrequire('./slow');"))
            .with_file("/srv/fast.js", module(""))
            .with_file("/srv/slow.js", module("")),
        slow: "/srv/slow.js",
        delayed: AtomicBool::new(false),
    });
    let compiler = Compiler::new(CompilerConfig::new(BASE), loader).unwrap();

    let abandoned = tokio::time::timeout(Duration::from_secs(1), compiler.compile("#main")).await;
    assert!(abandoned.is_err());
    assert!(compiler.cached("/srv/fast.js").is_some());
    assert!(compiler.cached("/srv/slow.js").is_none());
    assert!(compiler.cached("/srv/main.js").is_none());

    let compiled = compiler.compile("#main").await.unwrap().unwrap();
    assert_eq!(compiled.file.flattened, vec!["/srv/fast.js", "/srv/slow.js"]);
}

#[tokio::test]
async fn test_fs_loader_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let app = dir.path().join("srv/app");
    std::fs::create_dir_all(&app).unwrap();
    std::fs::write(
        app.join("package.json"),
        r#"{"alias": {"util": "app/lib/util"}}"#,
    )
    .unwrap();
    std::fs::create_dir_all(app.join("lib")).unwrap();
    std::fs::write(app.join("main.js"), module("var util = require('util');")).unwrap();
    std::fs::write(app.join("lib/util.js"), module("")).unwrap();

    let config = CompilerConfig::new("/srv").with_header_callee("define");
    let compiler = Compiler::new(config, Arc::new(FsLoader::new(dir.path()))).unwrap();

    let compiled = compiler.compile("/srv/app/main.js").await.unwrap().unwrap();
    assert_eq!(compiled.file.id, "#app/main");
    assert!(compiled.code.contains(
        r##"define("#app/main", ["#app/lib/util?t=#ts("/srv/app/lib/util.js")"], function"##
    ));
    assert!(compiled.code.contains("require('#app/lib/util?t=#ts(\"/srv/app/lib/util.js\")')"));
}
