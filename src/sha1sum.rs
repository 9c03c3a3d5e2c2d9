/*
unsparse, to decode Android sparse images: sha1 checksum module
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

use std::fmt::Display;

use hex::FromHex;

use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};

use crate::Result;

type Sha1sumByteArray = [u8; 20];

#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub(crate) struct Sha1sum(Sha1sumByteArray);

impl Sha1sum {
    pub(crate) fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self> {
        Ok(Self(Sha1sumByteArray::from_hex(hex)?))
    }

    #[cfg(test)]
    pub(crate) fn from_data(data: &[u8]) -> Self {
        Self(Sha1::digest(data).into())
    }
}

impl Display for Sha1sum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?
        }
        Ok(())
    }
}

impl Serialize for Sha1sum {
    fn serialize<S: Serializer>(&self, serializer: S)
        -> std::result::Result<S::Ok, S::Error>
    {
        serializer.collect_str(self)
    }
}

/// Running SHA1 over every materialized output byte
#[derive(Default)]
pub(crate) struct Sha1Hasher(Sha1);

impl Sha1Hasher {
    pub(crate) fn update(&mut self, data: &[u8]) {
        self.0.update(data)
    }

    /// Same as feeding `data` `count` times
    pub(crate) fn update_repeated(&mut self, data: &[u8], count: u64) {
        for _ in 0..count {
            self.0.update(data)
        }
    }

    pub(crate) fn finalize(self) -> Sha1sum {
        Sha1sum(self.0.finalize().into())
    }
}
