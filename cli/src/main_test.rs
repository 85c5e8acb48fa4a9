use super::*;

#[test]
fn parse_method_accepts_any_case() {
    assert_eq!(parse_method("get").unwrap(), Method::GET);
    assert_eq!(parse_method(" Delete ").unwrap(), Method::DELETE);
}

#[test]
fn parse_method_rejects_garbage() {
    assert!(matches!(parse_method("GE T"), Err(CliError::InvalidMethod(_))));
}

#[test]
fn parse_data_is_optional() {
    assert_eq!(parse_data(None).unwrap(), None);
    assert_eq!(parse_data(Some(r#"{"quantity":2}"#)).unwrap(), Some(json!({ "quantity": 2 })));
    assert!(matches!(parse_data(Some("{oops")), Err(CliError::InvalidJson(_))));
}

#[test]
fn flags_override_environment_config() {
    let config = resolve_config(
        ClientConfig::default(),
        Some("https://shop.example/"),
        Some(PathBuf::from("/tmp/storefront-state")),
    )
    .unwrap();
    assert_eq!(config.base_url, "https://shop.example");
    assert_eq!(config.state_dir, Some(PathBuf::from("/tmp/storefront-state")));
}

#[test]
fn blank_base_url_flag_is_rejected() {
    assert!(matches!(resolve_config(ClientConfig::default(), Some(" / "), None), Err(CliError::Config(_))));
}

#[test]
fn access_labels_name_redirect_target() {
    assert_eq!(access_label(Access::Allow), "allow");
    assert_eq!(access_label(Access::Redirect(guard::LOGIN_ROUTE)), "redirect /login");
}

#[test]
fn cli_parses_api_subcommand() {
    let cli = Cli::try_parse_from(["storefront", "api", "post", "/api/cart/add", "--data", "{}"]).unwrap();
    let Command::Api { method, path, data } = cli.command else { panic!("expected api command") };
    assert_eq!(method, "post");
    assert_eq!(path, "/api/cart/add");
    assert_eq!(data.as_deref(), Some("{}"));
}
