/*!
 * Command Execution
 *
 * The dispatcher owns the store and turns parsed requests into store
 * operations and replies. Argument counts are checked before anything is
 * touched, so a rejected command never mutates the store.
 */

use crate::protocol::{Reply, Request, Verb};
use crate::storage::Store;
use bytes::BytesMut;

pub struct Dispatcher {
    store: Store,
}

impl Dispatcher {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Execute a request and return its reply
    ///
    /// * `POST key value` - insert or overwrite, always `Ok`
    /// * `GET key` - `Value` or `NotFound`
    /// * `DELETE key` - `Ok` or `NotFound`
    /// * anything else, or a wrong argument count - `Invalid`
    pub fn exec(&mut self, req: Request) -> Reply {
        match req.verb {
            Verb::Post => match <[String; 2]>::try_from(req.args) {
                Ok([k, v]) => {
                    self.store.set(k, v);
                    Reply::Ok
                }
                Err(_) => Reply::Invalid,
            },

            Verb::Get => match req.args.as_slice() {
                [k] => match self.store.get(k) {
                    Some(v) => Reply::Value(v.to_string()),
                    None => Reply::NotFound,
                },
                _ => Reply::Invalid,
            },

            Verb::Delete => match req.args.as_slice() {
                [k] if self.store.del(k) => Reply::Ok,
                [_] => Reply::NotFound,
                _ => Reply::Invalid,
            },

            Verb::Unknown => Reply::Invalid,
        }
    }

    /// Execute a request and append the encoded reply to `out`
    #[inline]
    pub fn exec_into(&mut self, req: Request, out: &mut BytesMut) {
        self.exec(req).encode(out);
    }
}
