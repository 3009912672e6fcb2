//! Worker Patchers
//!
//! Strategies that prepend the spoof payload to worker source intercepted
//! by the hosting engine, before the worker engine parses it. Service
//! workers get a payload without interceptors; dedicated and shared workers
//! also carry the worker and Blob URL interceptors because they can spawn
//! nested workers.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use super::interceptors::es_module_import;
use super::layers::ExecutionContextType;
use super::manager::SpoofManager;
use super::runtime::ENVELOPE_MARKER;

/// Bytes scanned by [`is_es_module`].
pub const MODULE_SCAN_LIMIT: usize = 4096;

static SERVICE_WORKER_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[/_.-])(?:sw|service[-_]?worker|firebase-messaging-sw|ngsw-worker|workbox[\w.-]*|OneSignalSDKWorker)\.m?js(?:$|[?#])",
    )
    .expect("service worker regex is valid")
});

static SHARED_WORKER_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)shared[-_]?worker[\w.-]*\.m?js(?:$|[?#])").expect("shared worker regex is valid")
});

static DEDICATED_WORKER_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^blob:|worker[\w.-]*\.m?js(?:$|[?#]))").expect("worker regex is valid")
});

static MODULE_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)(?:^|[;\s}])(?:import(?:\s+[\w*{$]|\s*[*{])|import\s*['\x22]|export(?:\s+[\w*{$]|\s*[*{])|import\.meta\b)",
    )
    .expect("module syntax regex is valid")
});

static COMMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?(?:\*/|$)|//[^\n]*").expect("comment regex is valid"));

/// Whitespace and comments followed by a `use strict` directive.
static USE_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:\s|/\*(?s:.*?)\*/|//[^\n]*)*(?:'use strict'|"use strict")[ \t]*;?"#)
        .expect("use strict regex is valid")
});

/// Worker kind a script URL most likely belongs to.
///
/// Service worker names are checked first, then shared, then anything
/// containing `worker` or served from a `blob:` URL.
pub fn classify_worker_url(url: &str) -> Option<ExecutionContextType> {
    if SERVICE_WORKER_URL.is_match(url) {
        Some(ExecutionContextType::ServiceWorker)
    } else if SHARED_WORKER_URL.is_match(url) {
        Some(ExecutionContextType::SharedWorker)
    } else if DEDICATED_WORKER_URL.is_match(url) {
        Some(ExecutionContextType::DedicatedWorker)
    } else {
        None
    }
}

/// Heuristic: does `content` use module syntax in its first
/// [`MODULE_SCAN_LIMIT`] bytes, comments excluded?
pub fn is_es_module(content: &str) -> bool {
    let mut end = content.len().min(MODULE_SCAN_LIMIT);
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    let head = COMMENTS.replace_all(&content[..end], " ");
    MODULE_SYNTAX.is_match(&head)
}

/// Prepends `code` to a classic script, keeping a leading `'use strict'`
/// directive first so the script stays in strict mode. Comments before the
/// directive stay with it and a missing `;` is added.
fn prepend_classic(code: &str, content: &str) -> String {
    match USE_STRICT.find(content) {
        Some(m) => {
            let head = m.as_str();
            let semi = if head.ends_with(';') { "" } else { ";" };
            format!("{}{}\n{}{}", head, semi, code, &content[m.end()..])
        }
        None => format!("{}{}", code, content),
    }
}

/// Common contract of the three worker strategies.
pub trait WorkerPatcher: Send + Sync {
    /// The worker kind this patcher handles.
    fn worker_type(&self) -> ExecutionContextType;

    /// The manager that generates the payload.
    fn manager(&self) -> &SpoofManager;

    /// Whether `url` looks like a script for this patcher's worker kind.
    fn is_worker_script(&self, url: &str) -> bool {
        classify_worker_url(url) == Some(self.worker_type())
    }

    fn is_es_module(&self, content: &str) -> bool {
        is_es_module(content)
    }

    /// Classic-script prefix for `handle`, for streaming filters that must
    /// emit it before the body is available. Empty when the context has
    /// no resolvable profile and the fallback leaves workers unpatched.
    fn get_patch_code(&self, handle: i32) -> String {
        let manager = self.manager();
        let Some(profile) = manager.resolve_profile(handle) else {
            return String::new();
        };
        let context_id = manager.context_id_for(handle);
        manager.generate_worker_script(&profile, self.worker_type(), &context_id)
    }

    /// Returns `content` with the payload prepended. Sources that already
    /// carry a payload are returned unchanged.
    fn patch_script(&self, content: &str, url: &str, handle: i32) -> String {
        if content.contains(ENVELOPE_MARKER) {
            trace!("Worker script {} already patched", url);
            return content.to_string();
        }
        let code = self.get_patch_code(handle);
        if code.is_empty() {
            return content.to_string();
        }

        let patched = if self.is_es_module(content) {
            format!("{}{}", es_module_import(&code), content)
        } else {
            prepend_classic(&code, content)
        };
        debug!(
            "Patched {} script {} for context {} (+{} bytes)",
            self.worker_type(),
            url,
            handle,
            patched.len() - content.len()
        );
        patched
    }
}

macro_rules! worker_patcher {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            manager: Arc<SpoofManager>,
        }

        impl $name {
            pub fn new(manager: Arc<SpoofManager>) -> Self {
                Self { manager }
            }
        }

        impl WorkerPatcher for $name {
            fn worker_type(&self) -> ExecutionContextType {
                $kind
            }

            fn manager(&self) -> &SpoofManager {
                &self.manager
            }
        }
    };
}

worker_patcher!(
    /// Navigator, OffscreenCanvas, audio and timezone only; service
    /// workers cannot spawn workers of their own.
    ServiceWorkerPatcher,
    ExecutionContextType::ServiceWorker
);

worker_patcher!(
    /// Full worker layer plus the nested worker and Blob URL interceptors.
    DedicatedWorkerPatcher,
    ExecutionContextType::DedicatedWorker
);

worker_patcher!(
    /// Same payload as dedicated workers, booted once per shared instance.
    /// Pages never rewrite an http(s) shared worker URL, so every document
    /// keeps connecting to the same instance and this patcher is its only
    /// way in.
    SharedWorkerPatcher,
    ExecutionContextType::SharedWorker
);

/// All three patchers over one manager.
pub fn all_patchers(manager: Arc<SpoofManager>) -> Vec<Box<dyn WorkerPatcher>> {
    vec![
        Box::new(ServiceWorkerPatcher::new(manager.clone())),
        Box::new(DedicatedWorkerPatcher::new(manager.clone())),
        Box::new(SharedWorkerPatcher::new(manager)),
    ]
}

/// The patcher responsible for `url`, if any.
pub fn patcher_for_url<'a>(
    patchers: &'a [Box<dyn WorkerPatcher>],
    url: &str,
) -> Option<&'a dyn WorkerPatcher> {
    patchers
        .iter()
        .find(|p| p.is_worker_script(url))
        .map(|p| p.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_worker_urls() {
        use ExecutionContextType::*;
        assert_eq!(classify_worker_url("https://a.test/sw.js"), Some(ServiceWorker));
        assert_eq!(classify_worker_url("/service-worker.js?v=3"), Some(ServiceWorker));
        assert_eq!(classify_worker_url("/firebase-messaging-sw.js"), Some(ServiceWorker));
        assert_eq!(classify_worker_url("/ngsw-worker.js"), Some(ServiceWorker));
        assert_eq!(classify_worker_url("/shared-worker.js"), Some(SharedWorker));
        assert_eq!(classify_worker_url("/js/decoder.worker.js"), Some(DedicatedWorker));
        assert_eq!(classify_worker_url("blob:https://a.test/1234"), Some(DedicatedWorker));
        assert_eq!(classify_worker_url("/app.js"), None);
        assert_eq!(classify_worker_url("/swipe.js"), None);
    }

    #[test]
    fn test_module_detection() {
        assert!(is_es_module("import { x } from './x.js';"));
        assert!(is_es_module("import * as m from './m.js';"));
        assert!(is_es_module("import './side-effect.js';"));
        assert!(is_es_module("export default 1;"));
        assert!(is_es_module("const u = import.meta.url;"));
        assert!(!is_es_module("// import { x } from 'x';\nself.onmessage = f;"));
        assert!(!is_es_module("/* export default */ importScripts('a.js');"));
        assert!(!is_es_module("self.important = 1; exported();"));
    }

    #[test]
    fn test_module_detection_window() {
        let mut content = "a".repeat(MODULE_SCAN_LIMIT);
        content.push_str("\nimport x from 'x';");
        assert!(!is_es_module(&content));

        // multi-byte characters across the scan limit
        let content = "é".repeat(MODULE_SCAN_LIMIT);
        assert!(!is_es_module(&content));
    }

    #[test]
    fn test_prepend_keeps_use_strict_first() {
        let patched = prepend_classic("PATCH;\n", "'use strict';\nmain();");
        assert!(patched.starts_with("'use strict';\nPATCH;"));
        assert!(patched.ends_with("main();"));
        assert_eq!(prepend_classic("PATCH;\n", "main();"), "PATCH;\nmain();");
    }

    #[test]
    fn test_prepend_skips_leading_comments() {
        let content = "/*! lib v1 | MIT */\n// build 7\n\"use strict\"\nmain();";
        let patched = prepend_classic("PATCH;\n", content);
        assert_eq!(
            patched,
            "/*! lib v1 | MIT */\n// build 7\n\"use strict\";\nPATCH;\n\nmain();"
        );
    }

    #[test]
    fn test_prepend_ignores_quoted_strict_later() {
        let content = "main();\n'use strict';";
        assert_eq!(prepend_classic("PATCH;\n", content), format!("PATCH;\n{}", content));
    }
}
