use proc_macro2::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Error, LitStr};
use uuid::Uuid;

pub fn guid_impl(item: TokenStream) -> proc_macro::TokenStream {
    let item = item.into();
    let lit = parse_macro_input!(item as LitStr);

    let value = lit.value();
    let value = value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(&value);
    let id = match Uuid::try_parse(value) {
        Ok(id) => id,
        Err(err) => {
            return Error::new_spanned(lit, err).to_compile_error().into();
        }
    };

    let (data1, data2, data3, data4) = id.as_fields();
    let data4 = data4.iter();
    let item = quote! {
        ::fimo_com::guid::Guid::from_values(#data1, #data2, #data3, [#(#data4),*])
    };
    item.into()
}
