//! Client configuration snippets for provisioned records.

use crate::record::AuthRecord;

/// Render the tunnel-client configuration lines for a record.
///
/// The `meta_auth_*` entries are what the client presents back during the
/// registration handshake.
pub fn client_config_lines(record: &AuthRecord) -> Vec<String> {
    let valid_to = format!("meta_auth_valid_to={}", record.valid_until);
    let auth_key = format!("meta_auth_key={}", record.secret);

    if record.proxy_type.is_domain_based() {
        vec![
            format!("[{}-{}]", record.proxy_type, record.proxy_name),
            format!("type={}", record.proxy_type),
            format!("subdomain={}", record.subdomain),
            valid_to,
            auth_key,
            "use_gzip=true".into(),
            "#local_ip=".into(),
            "#local_port=".into(),
            "#pool_count=20".into(),
        ]
    } else if record.proxy_type.is_virtual_circuit() {
        vec![
            format!("[{}]", record.proxy_name),
            format!("type={}", record.proxy_type),
            "sk=changeme!".into(),
            "# connect this address to visitor stcp server".into(),
            "bind_addr=127.0.0.1".into(),
            "bind_port=0".into(),
            valid_to,
            auth_key,
            "# frpc role visitor -> frps -> frpc role server".into(),
            "#role=visitor".into(),
            "# the server name you want to visitor".into(),
            "#server_name=changeme!".into(),
            "#use_encryption=false".into(),
            "#use_compression=false".into(),
        ]
    } else {
        vec![
            format!("[{}]", record.proxy_name),
            format!("type={}", record.proxy_type),
            format!("remote_port={}", record.remote_port),
            valid_to,
            auth_key,
            "#local_ip=".into(),
            "#local_port=".into(),
            "#use_compression=false".into(),
        ]
    }
}

/// Render the configuration snippet as a small HTML page.
pub fn client_config_page(record: &AuthRecord) -> String {
    let body: String = client_config_lines(record)
        .iter()
        .map(|line| format!("<div>{}</div>\n", html_escape(line)))
        .collect();

    format!(
        "<html>\n<head>\n<title>Authorization</title>\n<style>\ndiv {{ padding-left: 20px; }}\n</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        body
    )
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
