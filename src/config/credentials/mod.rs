use super::schema::Config;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `ROLODEX_*` env var that is set and non-empty overwrites the
        /// corresponding config field.
        pub fn apply_env_overrides(config: &mut Config) {
            apply_overrides_from(config, |key| std::env::var(key).ok());
        }

        fn apply_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
            $(
                if let Some(val) = lookup($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    "gemini-api-key",          "ROLODEX_GEMINI_API_KEY"          => gemini.api_key;
    "telegram-bot-token",      "ROLODEX_TELEGRAM_BOT_TOKEN"      => telegram.bot_token;
    "telegram-secret-token",   "ROLODEX_TELEGRAM_SECRET_TOKEN"   => telegram.secret_token;
    "twilio-account-sid",      "ROLODEX_TWILIO_ACCOUNT_SID"      => twilio.account_sid;
    "twilio-auth-token",       "ROLODEX_TWILIO_AUTH_TOKEN"       => twilio.auth_token;
    "sweep-secret",            "ROLODEX_SWEEP_SECRET"            => sweep.secret;
}

/// Env var that overrides the credential slot `name`.
pub fn credential_env_var(name: &str) -> Option<&'static str> {
    CREDENTIAL_ENV_VARS
        .iter()
        .find(|(slot, _)| *slot == name)
        .map(|(_, env)| *env)
}
