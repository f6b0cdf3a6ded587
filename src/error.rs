/* Copyright (c) 2018 University of Utah
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR(S) DISCLAIM ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL AUTHORS BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

/// Errors the core can surface. Per spec.md 7, routine RPC-level failures
/// (timeout, malformed payload, scheduler submission failure) are *not*
/// represented here — they are recovered locally into task counters. This
/// enum only covers invalid construction. spec.md 7 also calls for
/// rejecting a null/missing RPC server at construction; that failure mode
/// has no variant here because it is unrepresentable by type instead —
/// `Task::new` takes `rpc` as a non-nullable `Arc`.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("malformed key hex string: {0}")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
