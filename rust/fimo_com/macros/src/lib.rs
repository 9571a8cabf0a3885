use proc_macro::TokenStream;

mod guid;

/// Parses an identity string of the form `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
///
/// Expands to a constant `fimo_com::guid::Guid` expression.
#[proc_macro]
pub fn guid(item: TokenStream) -> TokenStream {
    guid::guid_impl(item.into())
}
