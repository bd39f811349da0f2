// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole-system integration scenarios for the flight software runtime.
//! The tests live in `tests/`; this library exists to anchor the crate.
