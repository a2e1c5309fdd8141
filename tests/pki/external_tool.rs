use std::path::Path;

use certforge::config::SignerStrategy;
use certforge::pki::{
    self, CertificateSigner, ExternalToolSigner, IdentityRequest, InProcessSigner, WorkerPool,
};
use certforge::Error;
use chrono::Duration;

use super::support::{
    example_request, same_day, CaKeyKind, TestCertificateAuthority, TEST_PASSPHRASE,
};

const WORK_DIRS: [&str; 5] = ["key_files", "csr_files", "ext_files", "crt_files", "pem_files"];

fn openssl_available() -> bool {
    if which::which("openssl").is_ok() {
        return true;
    }
    eprintln!("openssl not found on PATH, skipping external-tool test");
    false
}

fn assert_work_dirs_empty(root: &Path) {
    for dir in WORK_DIRS {
        let entries: Vec<_> = std::fs::read_dir(root.join(dir))
            .unwrap_or_else(|e| panic!("read {dir}: {e}"))
            .collect();
        assert!(entries.is_empty(), "{dir} still holds {} file(s)", entries.len());
    }
}

fn equivalence_requests() -> Vec<IdentityRequest> {
    let mut bare = example_request(Duration::days(30));
    bare.dns_names.clear();
    bare.ip_addresses.clear();

    let mut separators = example_request(Duration::days(60));
    separators.subject.organization_name = "R+D".to_string();
    separators.subject.organizational_unit_name = "role=ops/edge".to_string();
    separators.subject.locality_name = "#1 Main St, \"Suite\" $5".to_string();
    separators.subject.common_name = "svc\\internal".to_string();
    separators.dns_names = vec!["api-1.example.com".to_string(), "*.example.com".to_string()];

    vec![example_request(Duration::days(90)), bare, separators]
}

#[tokio::test]
async fn external_and_in_process_signers_agree() {
    if !openssl_available() {
        return;
    }

    for kind in CaKeyKind::ALL {
        let ca = TestCertificateAuthority::generate_kind(kind).expect("generate CA");
        let material = ca.load().expect("load CA");
        let config = ca.signer_config(SignerStrategy::External);
        let external = ExternalToolSigner::new(&config, material.clone(), WorkerPool::new(2))
            .await
            .expect("external signer");
        let in_process = InProcessSigner::new(material.clone(), WorkerPool::new(2));

        for request in equivalence_requests() {
            let built = pki::build(&request).expect("build");

            let from_tool = external.sign(&built).await.expect("external sign");
            let from_library = in_process.sign(&built).await.expect("in-process sign");

            let tool_metadata =
                pki::extract(from_tool.certificate_pem.as_bytes()).expect("extract external");
            let library_metadata =
                pki::extract(from_library.certificate_pem.as_bytes()).expect("extract in-process");

            assert_eq!(tool_metadata.subject, request.subject, "{kind:?}");
            assert_eq!(tool_metadata.subject, library_metadata.subject);
            assert_eq!(tool_metadata.dns_names, request.dns_names);
            assert_eq!(tool_metadata.dns_names, library_metadata.dns_names);
            assert_eq!(tool_metadata.ip_addresses, library_metadata.ip_addresses);
            assert_eq!(tool_metadata.issuer, material.subject());
            assert_eq!(tool_metadata.issuer, library_metadata.issuer);
            assert!(same_day(tool_metadata.expiration_date, library_metadata.expiration_date));
            assert_ne!(tool_metadata.serial_number, library_metadata.serial_number);

            let tool_oid = ca.verify_issued(&from_tool.certificate_pem).expect("verify external");
            let library_oid =
                ca.verify_issued(&from_library.certificate_pem).expect("verify in-process");
            assert_eq!(tool_oid, kind.signature_oid(), "{kind:?}");
            assert_eq!(library_oid, tool_oid);

            let combined = from_tool.to_combined();
            assert!(combined.starts_with("-----BEGIN CERTIFICATE-----"));
            assert!(combined.contains("PRIVATE KEY-----"));
        }

        assert_work_dirs_empty(&ca.work_dir());
    }
}

#[tokio::test]
async fn mismatched_ca_key_fails_in_sign_step() {
    if !openssl_available() {
        return;
    }

    let ca = TestCertificateAuthority::generate().expect("generate CA");
    let material = ca.load().expect("load CA");
    let config = ca.signer_config(SignerStrategy::External);
    let signer = ExternalToolSigner::new(&config, material, WorkerPool::new(1))
        .await
        .expect("external signer");

    // The tool re-reads the CA key on every run; swap in a key that does not match.
    let other = TestCertificateAuthority::generate().expect("second CA");
    std::fs::copy(&other.key_path, &ca.key_path).expect("replace key");

    let err = signer
        .sign(&pki::build(&example_request(Duration::days(30))).expect("build"))
        .await
        .expect_err("sign with foreign key");

    match err {
        Error::Signing { message, diagnostics } => {
            assert!(message.contains("sign step failed"), "{message}");
            assert!(diagnostics.is_some_and(|d| !d.is_empty()));
        }
        other => panic!("expected signing error, got {other:?}"),
    }
    assert_work_dirs_empty(&ca.work_dir());
}

#[cfg(unix)]
#[tokio::test]
async fn failing_tool_surfaces_diagnostics_and_cleans_up() {
    use std::os::unix::fs::PermissionsExt;

    let ca = TestCertificateAuthority::generate().expect("generate CA");
    let tool_dir = tempfile::TempDir::new().expect("tool dir");
    let log_path = tool_dir.path().join("invocations.log");
    let script_path = tool_dir.path().join("openssl-stub");

    // Creates every -keyout/-out target, then fails the signing step.
    let script = format!(
        r#"#!/bin/sh
step="$1"
echo "$@" >> "{log}"
if [ -n "$CERTFORGE_CA_PASSPHRASE" ]; then echo "passphrase-in-env" >> "{log}"; fi
while [ $# -gt 0 ]; do
  case "$1" in
    -keyout|-out) shift; echo stub > "$1" ;;
  esac
  shift
done
if [ "$step" = "x509" ]; then
  echo "stub: bad decrypt" >&2
  exit 1
fi
exit 0
"#,
        log = log_path.display()
    );
    std::fs::write(&script_path, script).expect("write stub");
    std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod stub");

    let mut config = ca.signer_config(SignerStrategy::External);
    config.openssl_bin = script_path;
    let signer = ExternalToolSigner::new(&config, ca.load().expect("load CA"), WorkerPool::new(1))
        .await
        .expect("external signer");

    let err = signer
        .sign(&pki::build(&example_request(Duration::days(30))).expect("build"))
        .await
        .expect_err("stub fails");

    match &err {
        Error::Signing { diagnostics, .. } => {
            assert_eq!(diagnostics.as_deref(), Some("stub: bad decrypt"));
        }
        other => panic!("expected signing error, got {other:?}"),
    }
    assert_work_dirs_empty(&ca.work_dir());

    let log = std::fs::read_to_string(&log_path).expect("read log");
    let lines: Vec<&str> = log.lines().collect();
    assert!(lines[0].starts_with("req -new -newkey rsa:2048"));
    assert!(lines.iter().any(|line| line.starts_with("x509 -req")));
    assert!(lines.iter().any(|line| line.contains("-days 29") || line.contains("-days 30")));
    let passphrase_runs = lines.iter().filter(|line| **line == "passphrase-in-env");
    assert_eq!(passphrase_runs.count(), 1);
    assert!(!log.contains(TEST_PASSPHRASE));
}

#[tokio::test]
async fn missing_tool_is_a_signing_error() {
    let ca = TestCertificateAuthority::generate().expect("generate CA");
    let mut config = ca.signer_config(SignerStrategy::External);
    config.openssl_bin = ca.work_dir().join("no-such-openssl");

    let signer = ExternalToolSigner::new(&config, ca.load().expect("load CA"), WorkerPool::new(1))
        .await
        .expect("external signer");
    let err = signer
        .sign(&pki::build(&example_request(Duration::days(30))).expect("build"))
        .await
        .expect_err("tool missing");

    assert!(matches!(err, Error::Signing { .. }));
    assert_work_dirs_empty(&ca.work_dir());
}
