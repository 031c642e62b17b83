//! Canned SMTP replies, keyed by symbolic name. Process-wide read-only
//! state; the per-session strings (greeting, EHLO lines) are formatted by
//! the protocol engine instead.

pub struct Canned {
    pub success_mail_cmd: &'static str,
    pub success_rcpt_cmd: &'static str,
    pub success_reset_cmd: &'static str,
    pub success_verify_cmd: &'static str,
    pub success_noop_cmd: &'static str,
    pub success_quit_cmd: &'static str,
    pub success_data_cmd: &'static str,
    pub success_auth_cmd: &'static str,
    pub success_starttls_cmd: &'static str,
    /// AUTH PLAIN was issued without an initial response; we are waiting
    /// for the credentials line.
    pub positive_intermediate: &'static str,
    pub fail_line_too_long: &'static str,
    pub fail_syntax_error: &'static str,
    pub fail_nested_mail_cmd: &'static str,
    pub fail_need_mail_before_rcpt: &'static str,
    pub fail_no_recipients_data_cmd: &'static str,
    pub fail_unrecognized_cmd: &'static str,
    pub fail_max_unrecognized_cmd: &'static str,
    pub fail_invalid_auth: &'static str,
    pub fail_auth_not_supported: &'static str,
    pub error_too_many_recipients: &'static str,
    pub error_relay_denied: &'static str,
    pub fail_rcpt_cmd: &'static str,
    pub error_shutdown: &'static str,
    pub fail_read_limit_exceeded_data_cmd: &'static str,
    pub fail_message_size_exceeded: &'static str,
    pub fail_read_error_data_cmd: &'static str,
}

pub const CANNED: Canned = Canned {
    success_mail_cmd: "250 2.1.0 OK",
    success_rcpt_cmd: "250 2.1.5 OK",
    success_reset_cmd: "250 2.0.0 OK",
    success_verify_cmd: "252 2.1.5 Cannot verify user",
    success_noop_cmd: "250 2.0.0 OK",
    success_quit_cmd: "221 2.0.0 Bye",
    success_data_cmd: "354 Start mail input; end with <CRLF>.<CRLF>",
    success_auth_cmd: "235 2.7.0 Authentication successful",
    success_starttls_cmd: "220 2.0.0 Ready to start TLS",
    positive_intermediate: "334",
    fail_line_too_long: "500 5.5.6 Line too long.",
    fail_syntax_error: "501 5.5.4 Invalid command syntax",
    fail_nested_mail_cmd: "503 5.5.1 Error: nested MAIL command",
    fail_need_mail_before_rcpt: "503 5.5.1 Error: need MAIL before RCPT",
    fail_no_recipients_data_cmd: "554 5.5.1 Error: no valid recipients",
    fail_unrecognized_cmd: "500 5.5.1 Unrecognized command",
    fail_max_unrecognized_cmd: "554 5.5.1 Too many unrecognized commands",
    fail_invalid_auth: "535 5.7.8 Authentication credentials invalid",
    fail_auth_not_supported: "504 5.5.4 Unrecognized authentication type",
    error_too_many_recipients: "452 4.5.3 Too many recipients",
    error_relay_denied: "454 4.1.1 Error: Relay access denied:",
    fail_rcpt_cmd: "550 5.1.1 Error:",
    error_shutdown: "421 4.3.0 Server shutting down",
    fail_read_limit_exceeded_data_cmd: "550 5.3.4 Error:",
    fail_message_size_exceeded: "552 5.3.4 Error:",
    fail_read_error_data_cmd: "451 4.3.0 Error:",
};

const HELP_QUOTES: &[&str] = &[
    "Mail is the oldest distributed system still in production",
    "Be liberal in what you accept, within reason",
    "Every message deserves a reply code",
];

/// A little flavor for the HELP command, varied by client id.
pub fn help_quote(seed: u64) -> &'static str {
    HELP_QUOTES[(seed as usize) % HELP_QUOTES.len()]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn replies_start_with_a_reply_code() {
        let all = [
            CANNED.success_mail_cmd,
            CANNED.success_rcpt_cmd,
            CANNED.success_reset_cmd,
            CANNED.success_verify_cmd,
            CANNED.success_noop_cmd,
            CANNED.success_quit_cmd,
            CANNED.success_data_cmd,
            CANNED.success_auth_cmd,
            CANNED.success_starttls_cmd,
            CANNED.positive_intermediate,
            CANNED.fail_line_too_long,
            CANNED.fail_syntax_error,
            CANNED.fail_nested_mail_cmd,
            CANNED.fail_need_mail_before_rcpt,
            CANNED.fail_no_recipients_data_cmd,
            CANNED.fail_unrecognized_cmd,
            CANNED.fail_max_unrecognized_cmd,
            CANNED.fail_invalid_auth,
            CANNED.fail_auth_not_supported,
            CANNED.error_too_many_recipients,
            CANNED.error_relay_denied,
            CANNED.fail_rcpt_cmd,
            CANNED.error_shutdown,
            CANNED.fail_read_limit_exceeded_data_cmd,
            CANNED.fail_message_size_exceeded,
            CANNED.fail_read_error_data_cmd,
        ];
        for reply in all {
            let code = &reply[..3];
            assert!(
                code.chars().all(|c| c.is_ascii_digit()),
                "{reply:?} does not begin with a reply code"
            );
            assert!(matches!(reply.as_bytes().get(3), None | Some(b' ')));
        }
    }
}
