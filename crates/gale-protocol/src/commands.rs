//! Names of the built-in build commands.

pub const COMPOSE: &str = "compose";
pub const ECHO: &str = "echo";
pub const EXPORT: &str = "export";
pub const EXEC: &str = "exec";
pub const MKDIRS: &str = "mkdirs";
pub const CLEANDIR: &str = "cleandir";
pub const FAIL: &str = "fail";
pub const SECRET: &str = "secret";
pub const UPLOAD_ARTIFACT: &str = "uploadArtifact";
pub const DOWNLOAD_ARTIFACT: &str = "downloadArtifact";
pub const GENERATE_TEST_REPORT: &str = "generateTestReport";
pub const END: &str = "end";
pub const TEST: &str = "test";
