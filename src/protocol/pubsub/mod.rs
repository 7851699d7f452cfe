// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Publish/subscribe protocol pair: fan-out on the publishing side,
//! topic filtering through a compressed trie on the receiving side.

pub mod trie;
pub mod pbu;
pub mod sub;
