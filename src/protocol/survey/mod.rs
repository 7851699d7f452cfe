// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Survey protocol pair: the surveyor broadcasts a question to every
//! connected respondent and gathers answers until its deadline; each
//! respondent answers over the backtrace the question carried.

pub mod surveyor;
pub mod respondent;
