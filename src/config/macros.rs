/// `config_struct!` declares a configuration section and its defaults together
///
/// ```ignore
/// config_struct! {
///     pub struct EngineConfig {
///         max_swap_attempts: u32 = 100,
///         default_slippage: f64 = 0.01,
///     }
/// }
/// ```
///
/// Expands to a struct with public fields, a `Default` impl built from the
/// given values, and serde derives with `#[serde(default)]` so any field
/// missing from the TOML file keeps its default.
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
