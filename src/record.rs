/*
unsparse, to decode Android sparse images: on-disk record module
Copyright (C) 2024-present Guoxin "7Ji" Pu

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as
published by the Free Software Foundation, either version 3 of the
License, or (at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

/// Declare a fixed-size little-endian on-disk record made of integer fields,
/// laid out back to back with no padding.
///
/// Generates the struct, `SIZE`, `from_le_bytes()` and (for tests)
/// `to_le_bytes()`.
#[macro_export] macro_rules! le_record {
    (
        $(#[$meta: meta])*
        $vis: vis struct $stype: ident {
            $($(#[$fmeta: meta])* $field: ident: $ftype: ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $stype {
            $($(#[$fmeta])* pub(crate) $field: $ftype),*
        }

        impl $stype {
            pub(crate) const SIZE: usize =
                0 $(+ std::mem::size_of::<$ftype>())*;

            pub(crate) fn from_le_bytes(bytes: &[u8; $stype::SIZE]) -> Self {
                let mut offset = 0;
                $(
                    let $field = {
                        const LEN: usize = std::mem::size_of::<$ftype>();
                        let mut raw = [0; LEN];
                        raw.copy_from_slice(&bytes[offset..offset + LEN]);
                        offset += LEN;
                        <$ftype>::from_le_bytes(raw)
                    };
                )*
                let _ = offset;
                Self { $($field),* }
            }

            #[cfg(test)]
            pub(crate) fn to_le_bytes(&self) -> [u8; $stype::SIZE] {
                let mut bytes = [0; $stype::SIZE];
                let mut offset = 0;
                $(
                    let raw = self.$field.to_le_bytes();
                    bytes[offset..offset + raw.len()].copy_from_slice(&raw);
                    offset += raw.len();
                )*
                let _ = offset;
                bytes
            }
        }
    };
}
