//! Bling API v3 OAuth constants
//!
//! Endpoints, the fixed API version header, and the key names used by the
//! env store and the text credential file.

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://www.bling.com.br/Api/v3/oauth/token";

/// Authorization endpoint the browser is pointed at to obtain a code
pub const AUTHORIZE_ENDPOINT: &str = "https://www.bling.com.br/Api/v3/oauth/authorize";

/// Value of the `Accept` header Bling expects on the token endpoint
pub const API_VERSION: &str = "1.0";

/// Constant `state` sent with the authorization request
pub const AUTHORIZATION_STATE: &str = "vasco";

/// Timezone every expiration instant is computed in
pub const EXPIRATION_TIMEZONE: chrono_tz::Tz = chrono_tz::America::Sao_Paulo;

/// Env store keys for the client application registration
pub const ENV_CLIENT_ID: &str = "BLING_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "BLING_CLIENT_SECRET";

/// Env store keys for the automated browser login
pub const ENV_LOGIN_USERNAME: &str = "BLING_USUARIO";
pub const ENV_LOGIN_PASSWORD: &str = "BLING_SENHA_USUARIO";

/// Keys of a persisted credential, shared by the text file and the env store
pub const KEY_ACCESS_TOKEN: &str = "OAUTH_ACCESS_TOKEN";
pub const KEY_EXPIRES_IN: &str = "OAUTH_EXPIRES_IN";
pub const KEY_EXPIRATION: &str = "OAUTH_HOURS_EXPIRATION";
pub const KEY_REFRESH_TOKEN: &str = "OAUTH_REFRESH_TOKEN";
pub const KEY_SCOPE: &str = "OAUTH_SCOPE";
